#[tokio::main]
pub async fn main() {
    devplane_api::server::start().await;
}
