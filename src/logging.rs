//! # Logging モジュール
//!
//! 射撃指揮訓練セッションのログ出力を構成します。
//!
//! 射撃号令、任務の状態遷移、拒否された操作はtracingのイベントとして出力されます。
//! コンソールには簡潔な形式で、ファイルには訓練後の振り返り用にJSON形式で
//! 日単位のローテーション（logs/fdcsim.log.YYYY-MM-DD）で書き出します。
//! `RUST_LOG`が設定されていればレベル指定より優先されます。

use std::path::Path;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// ログ出力先
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogOutput {
    Console,
    File,
    Both,
}

impl LogOutput {
    pub fn writes_file(&self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }

    pub fn writes_console(&self) -> bool {
        matches!(self, LogOutput::Console | LogOutput::Both)
    }
}

impl FromStr for LogOutput {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(format!("無効なログ出力先: {} (console, file, both のいずれか)", s)),
        }
    }
}

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub output: LogOutput,
    /// ファイル出力先ディレクトリ
    pub log_dir: String,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            output: LogOutput::Console,
            log_dir: "logs".to_string(),
            file_prefix: "fdcsim".to_string(),
        }
    }
}

impl LogConfig {
    /// ファイル名（ローテーション時は日付が付加される）
    pub fn file_name(&self) -> String {
        format!("{}.log", self.file_prefix)
    }
}

/// tracingのサブスクライバを登録
///
/// ファイルへ書き出す場合は非同期書き込みのガードを返します。
/// ガードを破棄すると未書き込みのログが失われるため、セッション終了まで保持してください。
///
/// ```rust,no_run
/// use fdcsim::logging::{init_logging, LogConfig, LogOutput};
///
/// let config = LogConfig { output: LogOutput::Both, ..LogConfig::default() };
/// let _guard = init_logging(&config).expect("ログ初期化に失敗");
/// ```
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = config.output.writes_console().then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
    });

    let (file, guard) = if config.output.writes_file() {
        let appender = rolling::daily(&config.log_dir, config.file_name());
        let (writer, guard) = non_blocking(appender);
        (Some(fmt::layer().with_writer(writer).with_target(true).json()), Some(guard))
    } else {
        (None, None)
    };

    Registry::default().with(env_filter).with(console).with(file).try_init()?;
    Ok(guard)
}

/// ログレベル文字列を解析（大文字小文字は区別しない）
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    Level::from_str(level.trim()).map_err(|_| {
        format!("無効なログレベル: {} (trace, debug, info, warn, error のいずれか)", level)
    })
}

/// ファイル出力を行う設定ならログディレクトリを作成
pub fn ensure_log_directory(config: &LogConfig) -> std::io::Result<()> {
    if config.output.writes_file() && !Path::new(&config.log_dir).is_dir() {
        std::fs::create_dir_all(&config.log_dir)?;
    }
    Ok(())
}
