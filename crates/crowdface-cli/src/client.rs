// D-Bus proxy for crowdfaced. `#[zbus::proxy]` generates `CrowdfaceProxy`.
#[zbus::proxy(
    interface = "org.crowdface.Crowdface1",
    default_service = "org.crowdface.Crowdface1",
    default_path = "/org/crowdface/Crowdface1"
)]
pub trait Crowdface {
    async fn submit_frame(
        &self,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        detections: &str,
    ) -> zbus::Result<String>;
    async fn capture(
        &self,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
        detections: &str,
    ) -> zbus::Result<u32>;
    async fn captured_faces(&self) -> zbus::Result<String>;
    async fn remove_captured(&self, index: u32) -> zbus::Result<()>;
    async fn clear_captured(&self) -> zbus::Result<()>;
    async fn register(&self, name: &str) -> zbus::Result<Vec<u64>>;
    async fn list_faces(&self, filter: &str) -> zbus::Result<String>;
    async fn get_face(&self, id: u64) -> zbus::Result<String>;
    async fn record_answer(&self, id: u64, answer: &str) -> zbus::Result<String>;
    async fn rename(&self, id: u64, name: &str) -> zbus::Result<()>;
    async fn reset_name(&self, id: u64) -> zbus::Result<()>;
    async fn remove_face(&self, id: u64) -> zbus::Result<bool>;
    async fn clear_all(&self) -> zbus::Result<()>;
    async fn recent(&self) -> zbus::Result<String>;
    async fn import(&self, records: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}
