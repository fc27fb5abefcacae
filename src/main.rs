use anyhow::Result;
use grading_engine::utils::logging;
use grading_engine::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run().await?;

    if stats.failed > 0 {
        tracing::warn!("⚠️ {} 个提交评分失败", stats.failed);
    }

    Ok(())
}
