//! 规则引擎命令行
//!
//! 对文件中的规则集与用户属性做一次评估，或仅校验规则文档。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rule_engine::{Engine, EngineConfig, RuleSetParser};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use targeting_shared::config::AppConfig;
use targeting_shared::observability;
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-engine";

#[derive(Parser, Debug)]
#[command(name = "rule-engine")]
#[command(version, about = "定向规则评估引擎")]
#[command(propagate_version = true)]
struct Cli {
    /// 日志级别，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 评估规则集
    Eval {
        /// 规则文档路径
        #[arg(short, long)]
        rules: PathBuf,

        /// 用户属性 JSON 路径
        #[arg(short, long)]
        user: PathBuf,

        /// 在决策中附带评估追踪
        #[arg(long)]
        trace: bool,

        /// 格式化输出
        #[arg(long)]
        pretty: bool,
    },
    /// 按依赖顺序评估多规则集文档
    EvalAll {
        /// 多规则集文档路径
        #[arg(short, long)]
        bundle: PathBuf,

        /// 用户属性 JSON 路径
        #[arg(short, long)]
        user: PathBuf,

        /// 在决策中附带评估追踪
        #[arg(long)]
        trace: bool,

        /// 格式化输出
        #[arg(long)]
        pretty: bool,
    },
    /// 校验规则文档
    Validate {
        /// 规则文档路径
        #[arg(short, long)]
        rules: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut app_config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    if let Some(level) = cli.log_level {
        app_config.observability.log_level = level;
    }
    observability::init_tracing(&app_config.observability)?;

    let mut engine_config = EngineConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        warn!(error = %e, "引擎配置加载失败，使用默认配置");
        EngineConfig::default()
    });

    match cli.command {
        Commands::Eval {
            rules,
            user,
            trace,
            pretty,
        } => {
            engine_config.trace_enabled |= trace;
            let engine = Engine::new(engine_config);

            let rules = read_input(&rules)?;
            let user = read_input(&user)?;

            let response = engine.respond(&rules, &user);
            if pretty {
                println!("{}", response.to_json_pretty());
            } else {
                println!("{}", response.to_json());
            }

            Ok(if response.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::EvalAll {
            bundle,
            user,
            trace,
            pretty,
        } => {
            engine_config.trace_enabled |= trace;
            let engine = Engine::new(engine_config);

            let bundle = read_input(&bundle)?;
            let user = read_input(&user)?;

            let response = engine.respond_all(&bundle, &user);
            if pretty {
                println!("{}", response.to_json_pretty());
            } else {
                println!("{}", response.to_json());
            }

            Ok(if response.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Validate { rules } => {
            let parser = RuleSetParser::from_config(&engine_config);
            let content = read_input(&rules)?;

            match parser.parse(&content) {
                Ok(rule_set) => {
                    info!(rules = rule_set.len(), "规则文档校验通过");
                    println!("ok: {} rules", rule_set.len());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    println!("{}: {}", e.code(), e);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("无法读取文件 {}", path.display()))
}
