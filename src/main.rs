use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match nearmiss_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet (config errors).
            eprintln!("nearmiss: {e}");
            ExitCode::FAILURE
        }
    }
}
