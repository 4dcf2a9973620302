use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streetwise::app::Application;
use streetwise::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use streetwise_api::auth::{hash_api_key, parse_permission, ApiKeyService, JwtService, Permission};
use streetwise_config::AppConfig;
use streetwise_infrastructure::DatabaseManager;

fn cli() -> Command {
    Command::new("streetwise")
        .version(env!("CARGO_PKG_VERSION"))
        .about("StreetWise SEO 后台任务生命周期服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("配置文件路径，缺省时按默认路径查找"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .subcommand(Command::new("serve").about("启动API服务及后台任务（默认）"))
        .subcommand(Command::new("migrate").about("执行数据库迁移后退出"))
        .subcommand(
            Command::new("issue-token")
                .about("签发JWT访问令牌")
                .arg(
                    Arg::new("user-id")
                        .long("user-id")
                        .value_name("ID")
                        .required(true)
                        .help("令牌对应的用户ID"),
                )
                .arg(
                    Arg::new("permissions")
                        .long("permissions")
                        .value_name("LIST")
                        .value_delimiter(',')
                        .action(ArgAction::Append)
                        .help("权限列表，缺省为普通用户权限"),
                ),
        )
        .subcommand(
            Command::new("hash-api-key")
                .about("计算API Key摘要，用于写入配置文件")
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("KEY")
                        .help("待计算的API Key，缺省时随机生成"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // hash-api-key 不需要配置文件
    if let Some(("hash-api-key", sub)) = matches.subcommand() {
        let key = sub
            .get_one::<String>("key")
            .cloned()
            .unwrap_or_else(ApiKeyService::generate_api_key);
        println!("key:  {key}");
        println!("hash: {}", hash_api_key(&key));
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).context("加载配置失败")?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.to_string());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.to_string());
    init_logging(&log_level, &log_format)?;

    match matches.subcommand() {
        Some(("migrate", _)) => run_migrate(&config).await,
        Some(("issue-token", sub)) => issue_token(&config, sub),
        _ => run_server(config).await,
    }
}

/// 初始化日志系统
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

async fn run_server(config: AppConfig) -> Result<()> {
    info!("启动 StreetWise 后台任务服务");

    let app = Application::new(config).await?;
    app.run_until(ShutdownManager::new(), wait_for_shutdown_signal())
        .await
}

async fn run_migrate(config: &AppConfig) -> Result<()> {
    let database = DatabaseManager::from_config(&config.database)
        .await
        .context("创建数据库连接池失败")?;
    database.migrate().await.context("数据库迁移失败")?;
    database.close().await;
    info!("数据库迁移完成: {:?}", database.database_type());
    Ok(())
}

fn issue_token(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let user_id = sub
        .get_one::<String>("user-id")
        .context("缺少 --user-id 参数")?;

    let permissions = match sub.get_many::<String>("permissions") {
        Some(values) => values
            .map(|p| {
                parse_permission(p.trim()).ok_or_else(|| anyhow::anyhow!("未知的权限: {p}"))
            })
            .collect::<Result<Vec<Permission>>>()?,
        None => Permission::DEFAULT_USER.to_vec(),
    };

    let jwt = JwtService::new(
        &config.api.auth.jwt_secret,
        config.api.auth.jwt_expiration_hours as i64,
    );
    let token = jwt
        .generate_token(user_id, &permissions)
        .context("签发令牌失败")?;
    println!("{token}");
    Ok(())
}
