//! 环境变量配置加载

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 监听地址
    pub host: String,
    /// 服务监听端口
    pub port: u16,
    /// 上传文件暂存目录
    pub upload_dir: PathBuf,
    /// 挂载到 /static 的目录（存在时）
    pub static_dir: PathBuf,
    /// 挂载到 /well-known 的目录（存在时）
    pub well_known_dir: PathBuf,
    /// 请求体上限（字节）
    pub max_upload_bytes: usize,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源加载，缺省或无法解析时使用默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host = lookup("HOST")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| constants::DEFAULT_HOST.to_string());

        let port = parse_or(&lookup, "PORT", constants::DEFAULT_PORT);

        let upload_dir = lookup("UPLOAD_DIR")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);

        let static_dir = lookup("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("static"));

        let well_known_dir = lookup("WELL_KNOWN_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".well-known"));

        let max_upload_bytes = parse_or(
            &lookup,
            "MAX_UPLOAD_BYTES",
            constants::DEFAULT_MAX_UPLOAD_BYTES,
        );

        Self {
            host,
            port,
            upload_dir,
            static_dir,
            well_known_dir,
            max_upload_bytes,
        }
    }
}

/// 解析数值型变量，格式错误时告警并回退默认值
fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value for {}: '{}', using default {}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// 常量
pub mod constants {
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub const DEFAULT_PORT: u16 = 8000;

    /// 20 MiB
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

    /// multipart 中上传文件的字段名
    pub const UPLOAD_FIELD: &str = "inp_file";

    /// 服务名
    pub const SERVICE_NAME: &str = "xjp-hydro-agent";

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
