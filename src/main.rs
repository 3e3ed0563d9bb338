#[tokio::main]
async fn main() {
    if let Err(err) = labflow::run().await {
        eprintln!("labflow failed to start: {err}");
        std::process::exit(1);
    }
}
