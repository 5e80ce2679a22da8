use anyhow::{Context, Result};
use clap::{Arg, Command};
use jobrunner::app::{AppMode, Application};
use jobrunner::shutdown::wait_for_shutdown_signal;
use jobrunner_config::AppConfig;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("jobrunner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("异步任务分发系统")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，默认查找 config/jobrunner.toml"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("运行模式")
                .value_parser(["api", "worker", "all"])
                .default_value("all"),
        )
        .arg(
            Arg::new("worker-id")
                .long("worker-id")
                .value_name("ID")
                .help("Worker节点名，默认为 worker@<hostname>"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mode_str = matches
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("all");
    let worker_id = matches.get_one::<String>("worker-id");

    // 加载配置
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| match config_path {
            Some(path) => format!("加载配置文件失败: {path}"),
            None => "加载配置失败".to_string(),
        })?;

    // 初始化日志系统
    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动异步任务分发系统");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }
    info!("运行模式: {mode_str}");

    // 如果指定了worker-id，覆盖配置中的节点名
    if let Some(id) = worker_id {
        info!("Worker ID: {}", id);
        config.worker.node_name = Some(id.clone());
    }

    let app_mode = parse_app_mode(mode_str, &config)?;
    let app = Application::new(config, app_mode)?;
    let running = app.start().await?;

    // 等待关闭信号
    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    // 再次收到信号时不再等待执行中的任务
    tokio::select! {
        result = running.shutdown() => {
            result?;
            info!("应用已优雅关闭");
        }
        _ = wait_for_shutdown_signal() => {
            warn!("再次收到关闭信号，放弃等待执行中的任务，立即退出");
        }
    }

    info!("异步任务分发系统已退出");
    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于命令行和配置
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 解析应用运行模式
fn parse_app_mode(mode_str: &str, config: &AppConfig) -> Result<AppMode> {
    match mode_str {
        "api" => {
            if !config.api.enabled {
                return Err(anyhow::anyhow!("API模式被禁用，请检查配置"));
            }
            Ok(AppMode::Api)
        }
        "worker" => {
            if !config.worker.enabled {
                return Err(anyhow::anyhow!("Worker模式被禁用，请检查配置"));
            }
            Ok(AppMode::Worker)
        }
        "all" => {
            if !config.api.enabled && !config.worker.enabled {
                return Err(anyhow::anyhow!("API和Worker均被禁用，没有可运行的组件"));
            }
            Ok(AppMode::All)
        }
        _ => Err(anyhow::anyhow!("不支持的运行模式: {mode_str}")),
    }
}
