#[tokio::main]
async fn main() {
    careflow_lib::run().await
}
