use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::de::Deserializer;
use serde::Deserialize;

use crate::validator::M3U_MARKER;

const DEFAULT_CONFIG_FILE: &str = "iptv.toml";
const ENV_PREFIX: &str = "IPTV_AGG";

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0 Safari/537.36";

/// Immutable run configuration. Each pipeline stage is handed its own section.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(
        default = "default_sources",
        alias = "source",
        deserialize_with = "deserialize_one_or_many"
    )]
    pub sources: Vec<String>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub validate: ValidateConfig,
    #[serde(default)]
    pub select: SelectConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            fetch: FetchConfig::default(),
            validate: ValidateConfig::default(),
            select: SelectConfig::default(),
            filter: FilterConfig::default(),
            categories: CategoryConfig::default(),
            output: OutputConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_sources() -> Vec<String> {
    [
        "https://raw.githubusercontent.com/NextMouse/IPTVMeroser/main/IPTV.m3u",
        "https://live.zbds.top/tv/iptv4.m3u",
        "http://tv123.tttttttttt.top/txt/001.txt",
        "http://iptv.live-tv.top/m3u/iptv.m3u8",
        "https://iptv-org.github.io/iptv/channels/cn.m3u",
        "https://raw.githubusercontent.com/imDazui/Tvlist-awesome-m3u-m3u8/master/iptv.m3u8",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn deserialize_one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    /// Total attempts per remote endpoint, including the first.
    pub attempts: u32,
    pub backoff_millis: u64,
    pub concurrency: usize,
    pub user_agent: String,
    pub referer: String,
    pub accept_invalid_certs: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            attempts: 3,
            backoff_millis: 2000,
            concurrency: 8,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: "https://github.com/".to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub max_candidates_per_channel: usize,
    /// Manifests advertising a lower height are rejected.
    pub min_height: u32,
    pub probe_bytes: usize,
    pub manifest_limit_bytes: usize,
    pub user_agent: String,
    pub accept_invalid_certs: bool,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 8,
            concurrency: 20,
            max_candidates_per_channel: 10,
            min_height: 480,
            probe_bytes: 10 * 1024,
            manifest_limit_bytes: 256 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl ValidateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectConfig {
    pub best_count: usize,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self { best_count: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub deny: Vec<String>,
    pub allow: Vec<String>,
    /// Header lines of delimited-text playlists.
    pub skip_prefixes: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            deny: strings(&[
                "广告", "测试", "购物", "付费", "VIP", "破解", "成人", "境外", "港澳台", "民族",
                "藏语", "维语", "蒙语", "哈萨克语",
            ]),
            allow: strings(&[
                "湖南", "长沙", "芒果", "经视", "都市", "娱乐", "电视剧", "公共", "政法", "潇湘",
                "金鹰", "卫视",
            ]),
            skip_prefixes: strings(&["类型：", "节目数量：", "type:", "count:"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Ordered category table; the first rule with a matching keyword wins.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub rules: Vec<CategoryRule>,
    pub default_category: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        let rule = |name: &str, keywords: &[&str]| CategoryRule {
            name: name.to_string(),
            keywords: strings(keywords),
        };
        Self {
            rules: vec![
                rule(
                    "央视综合",
                    &[
                        "CCTV-1", "CCTV-2", "CCTV-3", "CCTV-4", "CCTV-5", "CCTV-5+", "CCTV-6",
                        "CCTV-7", "CCTV-8", "CCTV-9", "CCTV-10", "CCTV-11", "CCTV-12", "CCTV-13",
                        "CCTV-14", "CCTV-15", "CCTV-16", "CCTV-17", "央视",
                    ],
                ),
                rule(
                    "卫视频道",
                    &[
                        "湖南卫视", "浙江卫视", "东方卫视", "江苏卫视", "北京卫视", "安徽卫视",
                        "山东卫视", "天津卫视", "湖北卫视", "河南卫视", "江西卫视", "四川卫视",
                        "重庆卫视", "广东卫视", "广西卫视", "云南卫视", "贵州卫视", "辽宁卫视",
                        "黑龙江卫视", "吉林卫视", "福建卫视", "东南卫视",
                    ],
                ),
                rule(
                    "地方频道",
                    &[
                        "珠江", "南方", "深圳", "广州", "杭州", "南京", "成都", "武汉", "长沙",
                        "青岛", "大连", "厦门", "上海", "北京",
                    ],
                ),
                rule(
                    "特色频道",
                    &[
                        "卡通", "少儿", "体育", "动漫", "新闻", "电影", "综艺", "音乐", "戏曲",
                        "纪实",
                    ],
                ),
            ],
            default_category: "其他频道".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub epg_url: Option<String>,
    pub logo_url: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("playlist.m3u8"),
            epg_url: Some("https://epg.112114.xyz/epg.xml".to_string()),
            logo_url: "https://p0.ssl.qhimg.com/t01065a244095ef204.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus text exposition is written here after each run.
    pub textfile: Option<PathBuf>,
}

impl Settings {
    /// Layers an optional TOML file and `IPTV_AGG_*` environment variables
    /// over the defaults. A missing file is only an error when it was
    /// named explicitly. Call [`Settings::validate`] once all overrides
    /// are applied.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("failed to read configuration")?;
        settings
            .try_deserialize()
            .context("invalid configuration")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sources.is_empty() {
            bail!("no playlist sources configured");
        }
        if self.fetch.concurrency == 0 || self.validate.concurrency == 0 {
            bail!("worker pool sizes must be at least 1");
        }
        if self.fetch.attempts == 0 {
            bail!("fetch.attempts must be at least 1");
        }
        if self.select.best_count == 0 {
            bail!("select.best_count must be at least 1");
        }
        if self.validate.max_candidates_per_channel == 0 {
            bail!("validate.max_candidates_per_channel must be at least 1");
        }
        if self.validate.probe_bytes == 0 {
            bail!("validate.probe_bytes must be at least 1");
        }
        if self.validate.manifest_limit_bytes < M3U_MARKER.len() {
            bail!(
                "validate.manifest_limit_bytes must be at least {}",
                M3U_MARKER.len()
            );
        }
        if self.filter.allow.is_empty() {
            bail!("filter.allow must name at least one keyword");
        }
        Ok(())
    }
}
