//! # VidGen 主程序
//!
//! 加载配置、初始化数据库并启动管理API与后台任务

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vidgen::{
    Result,
    app::{AppContext, AppResources, AppTasks},
    config::ConfigManager,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    management::ManagementServer,
};

#[derive(Debug, Parser)]
#[command(name = "vidgen", version, about = "VidGen entitlement and key rotation service")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 仅执行数据库迁移后退出
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = match &cli.config {
        Some(path) => ConfigManager::from_file(path).await,
        None => ConfigManager::new().await,
    };
    let config = match config_manager {
        Ok(manager) => manager.get_config().await,
        Err(e) => {
            logging::init_optimized_logging(cli.log_level.as_deref());
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "config_load_failed",
                &format!("配置加载失败: {e}")
            );
            return Err(e);
        }
    };

    logging::init_optimized_logging(cli.log_level.as_deref().or(config.log_level.as_deref()));
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        port = config.server.port
    );

    let resources = AppResources::initialize(config).await?;
    if cli.migrate_only {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "migrate_only_done",
            "数据库迁移完成，按 --migrate-only 退出"
        );
        return Ok(());
    }

    let context = Arc::new(AppContext::from_resources(&resources)?);
    let tasks = AppTasks::new(&context);
    tasks.start_all().await;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Main,
                "signal_listen_failed",
                &format!("无法监听退出信号: {e}")
            );
        }
        signal_token.cancel();
    });

    let server = ManagementServer::new(&resources.config().server, Arc::clone(&context));
    let served = server.serve(shutdown).await;
    tasks.stop_all().await;

    if let Err(e) = &served {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "service_failed",
            &format!("服务异常退出: {e}")
        );
    } else {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "service_shutdown",
            "服务正常关闭"
        );
    }
    served
}
