use cortex_provider::{init_logging, serve, CortexProvider, ServeError};

#[tokio::main]
async fn main() -> Result<(), ServeError> {
    init_logging();
    serve(CortexProvider::new()).await
}
