use std::path::PathBuf;
use std::time::Duration;

use crate::models::QuestionType;
use crate::worker::SelectionStrategy;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时评分的提交数量
    pub max_concurrent_submissions: usize,
    /// 协调者实例数量（每个实例同一时间只处理一个会话）
    pub coordinator_count: usize,
    /// 工作者数量
    pub worker_count: usize,
    /// 单个工作者同时进行的评估数量
    pub worker_max_in_flight: usize,
    /// 任务分派策略
    pub dispatch_strategy: SelectionStrategy,
    /// 分发前是否探测工作者容量
    pub capacity_check_enabled: bool,
    /// 容量探测超时（毫秒）
    pub capacity_check_timeout_ms: u64,
    /// 调用方等待评分结果的超时（秒）
    pub grading_timeout_secs: u64,
    /// 选择题逐题反馈被采纳的最小长度
    pub mcq_feedback_min_len: usize,
    /// 协调者忙碌时最多排队的提交数
    pub max_queued_sessions: usize,
    /// 评分表目录
    pub rubric_folder: String,
    /// 待评分提交（TOML）目录
    pub submissions_folder: String,
    /// 评分结果文件（追加写入）
    pub results_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 4,
            coordinator_count: 4,
            worker_count: 8,
            worker_max_in_flight: 2,
            dispatch_strategy: SelectionStrategy::RoundRobin,
            capacity_check_enabled: true,
            capacity_check_timeout_ms: 5_000,
            grading_timeout_secs: 600,
            mcq_feedback_min_len: 50,
            max_queued_sessions: 16,
            rubric_folder: "rubrics".to_string(),
            submissions_folder: "submissions".to_string(),
            results_file: "grading_results.csv".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_submissions: env_parse("MAX_CONCURRENT_SUBMISSIONS").unwrap_or(default.max_concurrent_submissions),
            coordinator_count: env_parse("COORDINATOR_COUNT").unwrap_or(default.coordinator_count),
            worker_count: env_parse("WORKER_COUNT").unwrap_or(default.worker_count),
            worker_max_in_flight: env_parse("WORKER_MAX_IN_FLIGHT").unwrap_or(default.worker_max_in_flight),
            dispatch_strategy: env_parse("DISPATCH_STRATEGY").unwrap_or(default.dispatch_strategy),
            capacity_check_enabled: env_parse("CAPACITY_CHECK_ENABLED").unwrap_or(default.capacity_check_enabled),
            capacity_check_timeout_ms: env_parse("CAPACITY_CHECK_TIMEOUT_MS").unwrap_or(default.capacity_check_timeout_ms),
            grading_timeout_secs: env_parse("GRADING_TIMEOUT_SECS").unwrap_or(default.grading_timeout_secs),
            mcq_feedback_min_len: env_parse("MCQ_FEEDBACK_MIN_LEN").unwrap_or(default.mcq_feedback_min_len),
            max_queued_sessions: env_parse("MAX_QUEUED_SESSIONS").unwrap_or(default.max_queued_sessions),
            rubric_folder: std::env::var("RUBRIC_FOLDER").unwrap_or(default.rubric_folder),
            submissions_folder: std::env::var("SUBMISSIONS_FOLDER").unwrap_or(default.submissions_folder),
            results_file: std::env::var("RESULTS_FILE").unwrap_or(default.results_file),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        }
    }

    /// 协调者状态机需要的那部分配置
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            rubric_folder: PathBuf::from(&self.rubric_folder),
            capacity_check_enabled: self.capacity_check_enabled,
            capacity_check_timeout: Duration::from_millis(self.capacity_check_timeout_ms),
            grading_timeout: Duration::from_secs(self.grading_timeout_secs),
            mcq_feedback_min_len: self.mcq_feedback_min_len,
            max_queued_sessions: self.max_queued_sessions,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// 协调者配置
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub rubric_folder: PathBuf,
    pub capacity_check_enabled: bool,
    pub capacity_check_timeout: Duration,
    pub grading_timeout: Duration,
    pub mcq_feedback_min_len: usize,
    pub max_queued_sessions: usize,
}

impl CoordinatorConfig {
    /// 按题型定位评分表文件：`<rubric_folder>/<题型>.toml`
    pub fn rubric_path(&self, question_type: QuestionType) -> PathBuf {
        self.rubric_folder
            .join(format!("{}.toml", question_type.file_stem()))
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Config::default().coordinator_config()
    }
}
