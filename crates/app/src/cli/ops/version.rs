use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Version;

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = std::convert::Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        Ok(format!(
            "quill {} ({}, {} build, built {})",
            env!("CARGO_PKG_VERSION"),
            env!("QUILL_REVISION"),
            env!("QUILL_BUILD_PROFILE"),
            env!("QUILL_BUILD_TIMESTAMP"),
        ))
    }
}
