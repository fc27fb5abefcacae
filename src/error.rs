use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 评分表相关错误
    #[error("评分表错误: {0}")]
    Rubric(#[from] RubricError),
    /// 协调者 / 工作者之间的协议错误
    #[error("协议错误: {0}")]
    Protocol(#[from] ProtocolError),
    /// 提交数据错误
    #[error("提交错误: {0}")]
    Submission(#[from] SubmissionError),
    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 评分表错误
#[derive(Debug, Error)]
pub enum RubricError {
    /// 评分表为空
    #[error("评分表没有任何评分项")]
    Empty,
    /// 评分项名称为空
    #[error("第 {index} 个评分项缺少名称")]
    MissingCategory { index: usize },
    /// 评分项名称重复
    #[error("评分项重复: {category}")]
    DuplicateCategory { category: String },
    /// 满分不是正数
    #[error("评分项 {category} 的满分必须大于 0")]
    NonPositiveMaxPoints { category: String },
    /// 档位分数超过满分
    #[error("评分项 {category} 的档位 {band} 分数 {points} 超过满分 {max_points}")]
    BandExceedsMax {
        category: String,
        band: String,
        points: u32,
        max_points: u32,
    },
}

/// 协议错误
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// 工作者池中没有可用工作者
    #[error("工作者池为空")]
    NoWorkers,
    /// 目标的收件箱已关闭
    #[error("{target} 的收件箱已关闭")]
    MailboxClosed { target: String },
    /// 对方未回复就丢弃了回复地址
    #[error("{target} 未回复")]
    NoReply { target: String },
    /// 请求超时
    #[error("等待 {target} 超时 ({timeout_ms} ms)")]
    Timeout { target: String, timeout_ms: u64 },
    /// 路由器没有可用协调者
    #[error("没有可用的协调者")]
    NoCoordinators,
}

/// LLM 服务错误
///
/// 由服务层经 `anyhow` 向上传递，评分工作者把它降级为该维度的失败。
#[derive(Debug, Error)]
pub enum LlmError {
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析为评分结果
    #[error("无法解析LLM返回的评分结果 (响应: {response})")]
    UnparseableEvaluation { response: String },
}

/// 提交数据错误
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// 学生ID为空
    #[error("学生ID不能为空")]
    EmptyStudentId,
    /// 选择题 / 简答题缺少标准答案
    #[error("{question_type} 题型必须提供标准答案")]
    MissingAnswerKey { question_type: String },
    /// 未知题型
    #[error("无法解析题型: {value}")]
    UnknownQuestionType { value: String },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取 / 写入错误
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }

    /// 创建 TOML 解析错误
    pub fn toml_parse(path: impl Into<String>, source: toml::de::Error) -> Self {
        AppError::TomlParse {
            path: path.into(),
            source,
        }
    }

    /// 创建收件箱已关闭错误
    pub fn mailbox_closed(target: impl Into<String>) -> Self {
        AppError::Protocol(ProtocolError::MailboxClosed {
            target: target.into(),
        })
    }

    /// 创建未回复错误
    pub fn no_reply(target: impl Into<String>) -> Self {
        AppError::Protocol(ProtocolError::NoReply {
            target: target.into(),
        })
    }

    /// 创建超时错误
    pub fn timeout(target: impl Into<String>, timeout: std::time::Duration) -> Self {
        AppError::Protocol(ProtocolError::Timeout {
            target: target.into(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
