use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    emotion_coach_lib::run().await
}
