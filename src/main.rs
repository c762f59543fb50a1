use clap::{Args, Parser, Subcommand};
use mem0_client::api::HttpMemoryApi;
use mem0_client::api::types::Metadata;
use mem0_client::config::AppConfig;
use mem0_client::display;
use mem0_client::error::{ClientError, FormatError, Result};
use mem0_client::parser::ExtractMode;
use mem0_client::search::{MemorySearcher, TimeRange};
use mem0_client::upload::{MemoryUploader, UploadOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mem0")]
#[command(about = "上传对话记录到 Mem0 并检索记忆")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ./config.yaml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct UploadArgs {
    /// 记忆所属用户
    #[arg(short, long)]
    user_id: Option<String>,

    /// 处理模式
    #[arg(short = 'm', long, value_parser = ["auto", "raw"])]
    extract_mode: Option<String>,

    /// 给服务端提取模型的自定义指令
    #[arg(long, visible_alias = "ci")]
    custom_instructions: Option<String>,

    /// 重点提取的内容类型（逗号分隔）
    #[arg(long, visible_alias = "inc")]
    includes: Option<String>,

    /// 排除的内容类型（逗号分隔）
    #[arg(long, visible_alias = "exc")]
    excludes: Option<String>,

    /// 交给服务端推理提取记忆
    #[arg(long, conflicts_with = "no_infer")]
    infer: bool,

    /// 原样保存消息，不做推理
    #[arg(long)]
    no_infer: bool,

    /// 附加元数据（JSON 对象，只接受标量值）
    #[arg(long)]
    metadata: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传一段文本
    UploadText {
        content: String,
        #[command(flatten)]
        upload: UploadArgs,
    },

    /// 上传单个文件（.json / .md / .txt）
    UploadFile {
        path: PathBuf,
        #[command(flatten)]
        upload: UploadArgs,
    },

    /// 上传目录下所有受支持的文件
    UploadDir {
        dir: PathBuf,
        #[command(flatten)]
        upload: UploadArgs,

        /// 递归子目录（默认）
        #[arg(long, overrides_with = "no_recursive")]
        recursive: bool,

        /// 只处理顶层文件
        #[arg(long, overrides_with = "recursive")]
        no_recursive: bool,

        /// 并发上传
        #[arg(long)]
        concurrent: bool,

        /// 并发 worker 数（默认取配置）
        #[arg(short, long)]
        workers: Option<usize>,

        /// 将批量报告保存为 JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 语义检索
    Search {
        query: String,
        #[arg(short, long)]
        user_id: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        /// 显示完整内容
        #[arg(long)]
        show_full: bool,
    },

    /// 按时间范围检索
    SearchTime {
        /// 最近 N 天
        #[arg(short, long)]
        days: Option<u32>,
        /// 配置中的预设时间范围
        #[arg(short, long)]
        preset: Option<String>,
        /// 起始日期（YYYY-MM-DD）
        #[arg(long)]
        start_date: Option<String>,
        /// 结束日期（YYYY-MM-DD）
        #[arg(long)]
        end_date: Option<String>,
        /// 在时间范围内做语义检索
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long)]
        user_id: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        show_full: bool,
    },

    /// 生成周报数据
    WeeklyReport {
        /// 往前第几周（1 = 上周）
        #[arg(short, long, default_value_t = 1)]
        weeks_back: u32,
        #[arg(short, long)]
        user_id: Option<String>,
        /// 将周报保存为 JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 检索与给定内容相关的记忆
    SearchRelated {
        content: String,
        #[arg(short, long)]
        user_id: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        /// 排除最近 N 天的记忆
        #[arg(long)]
        exclude_days: Option<u32>,
    },

    /// 用户记忆统计
    Stats {
        #[arg(short, long)]
        user_id: Option<String>,
    },

    /// 检查配置
    ConfigCheck,
}

// ── 入口 ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("❌ {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn init_tracing(config: &AppConfig) {
    let default = if config.debug.enable_api_logging {
        "mem0_client=debug"
    } else {
        "mem0_client=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()))
        .init();
}

async fn run(command: Commands, config: AppConfig) -> Result<()> {
    if let Commands::ConfigCheck = command {
        return config_check(&config);
    }

    config.validate()?;
    let api = Arc::new(HttpMemoryApi::new(&config.mem0)?);
    let config = Arc::new(config);

    match command {
        Commands::UploadText { content, upload } => {
            let uploader = MemoryUploader::new(config, api);
            let options = upload.into_options()?;
            let response = uploader.upload_text(&content, &options).await?;
            println!("✅ 上传成功");
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::UploadFile { path, upload } => {
            let uploader = MemoryUploader::new(config, api);
            let options = upload.into_options()?;
            let outcome = uploader.upload_file(&path, &options).await;
            match outcome.error_preview() {
                None => println!("✅ {} 上传成功（尝试 {} 次）", path.display(), outcome.attempts()),
                Some(e) => {
                    return Err(ClientError::Other(format!(
                        "{} 上传失败（尝试 {} 次）: {}",
                        path.display(),
                        outcome.attempts(),
                        e
                    )));
                }
            }
        }
        Commands::UploadDir {
            dir,
            upload,
            recursive: _,
            no_recursive,
            concurrent,
            workers,
            output,
        } => {
            let mut config = (*config).clone();
            if concurrent {
                config.batch.concurrent = true;
            }
            if let Some(w) = workers {
                config.batch.max_workers = w;
            }
            config.validate_limits()?;

            let uploader = MemoryUploader::new(Arc::new(config), api);
            let options = upload.into_options()?;
            if options.has_custom_settings() {
                println!("🔧 使用自定义处理参数");
            }
            let report = uploader.upload_directory(&dir, !no_recursive, &options).await?;
            println!("{}", display::render_batch_report(&report));
            if let Some(path) = output {
                save_json(&path, &report)?;
            }
        }
        Commands::Search {
            query,
            user_id,
            limit,
            show_full,
        } => {
            let searcher = MemorySearcher::new(config, api);
            let results = searcher
                .search_by_query(&query, user_id.as_deref(), limit, None)
                .await?;
            println!("{}", display::render_results("🔍 检索结果", &results, show_full));
        }
        Commands::SearchTime {
            days,
            preset,
            start_date,
            end_date,
            query,
            user_id,
            limit,
            show_full,
        } => {
            let searcher = MemorySearcher::new(config, api);
            let range = searcher.resolve_time_range(
                days,
                preset.as_deref(),
                start_date.as_deref(),
                end_date.as_deref(),
            )?;
            let results = searcher
                .search_by_time_range(&range, user_id.as_deref(), query.as_deref(), limit)
                .await?;
            println!("{}", display::render_results("📅 时间范围检索", &results, show_full));
        }
        Commands::WeeklyReport {
            weeks_back,
            user_id,
            output,
        } => {
            let searcher = MemorySearcher::new(config, api);
            let report = searcher.weekly_report(weeks_back, user_id.as_deref()).await?;
            println!("{}", display::render_weekly_report(&report, false));
            if let Some(path) = output {
                save_json(&path, &report)?;
            }
        }
        Commands::SearchRelated {
            content,
            user_id,
            limit,
            exclude_days,
        } => {
            let searcher = MemorySearcher::new(config, api);
            let exclude = exclude_days.map(|d| TimeRange::last_days(d, chrono::Utc::now()));
            let results = searcher
                .search_related(&content, user_id.as_deref(), exclude.as_ref(), limit)
                .await?;
            println!("{}", display::render_results("🔗 相关记忆", &results, false));
        }
        Commands::Stats { user_id } => {
            let searcher = MemorySearcher::new(config, api);
            let stats = searcher.user_stats(user_id.as_deref()).await?;
            println!("{}", display::render_stats(&stats));
        }
        Commands::ConfigCheck => {}
    }
    Ok(())
}

impl UploadArgs {
    fn into_options(self) -> Result<UploadOptions> {
        let mut options = UploadOptions::new();
        options.user_id = self.user_id;
        options.extract_mode = self
            .extract_mode
            .as_deref()
            .map(str::parse::<ExtractMode>)
            .transpose()?;
        options.custom_instructions = self.custom_instructions;
        options.includes = self.includes;
        options.excludes = self.excludes;
        options.infer = match (self.infer, self.no_infer) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        };
        if let Some(raw) = self.metadata {
            options.metadata = parse_metadata(&raw)?;
        }
        Ok(options)
    }
}

fn parse_metadata(raw: &str) -> Result<Metadata> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(FormatError::InvalidMetadata("metadata must be a JSON object".to_string()).into()),
        Err(e) => Err(FormatError::InvalidMetadata(e.to_string()).into()),
    }
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    println!("💾 已保存到 {}", path.display());
    Ok(())
}

fn config_check(config: &AppConfig) -> Result<()> {
    println!("{}", display::banner("🔧 配置检查"));
    let key_status = if config.mem0.api_key.trim().is_empty() {
        "❌ 未设置"
    } else {
        "✅ 已设置"
    };
    println!("API Key: {key_status}");
    println!("Base URL: {}", config.mem0.base_url);
    println!("默认用户: {}", config.defaults.user_id);
    println!("默认处理模式: {}", config.defaults.extract_mode);
    println!("支持的格式: {}", config.file_processing.supported_formats.join(", "));
    println!("文件大小上限: {}MB", config.file_processing.max_file_size_mb);
    println!(
        "检索条数: 默认 {} / 上限 {}",
        config.search.default_limit, config.search.max_limit
    );
    println!(
        "批量上传: {}，worker {} 个",
        if config.batch.concurrent { "并发" } else { "顺序" },
        config.batch.max_workers
    );
    println!(
        "重试: 最多 {} 次，基础延迟 {}ms，抖动 {}ms",
        config.retry.max_attempts, config.retry.base_delay_ms, config.retry.jitter_ms
    );
    println!(
        "API 调试日志: {}",
        if config.debug.enable_api_logging { "开启" } else { "关闭" }
    );
    config.validate()?;
    println!("✅ 配置有效");
    Ok(())
}
