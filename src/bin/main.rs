//! Binary entrypoint for autopm

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    autopm::cli::run().await
}
