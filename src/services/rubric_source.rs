//! 评分表来源 - 业务能力层

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::models::{load_rubric, RubricItem};

/// 评分表来源契约，返回的每个评分项名称唯一
#[async_trait]
pub trait RubricSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Vec<RubricItem>>;
}

/// 从 TOML 文件加载评分表
#[derive(Debug, Default, Clone)]
pub struct TomlRubricSource;

#[async_trait]
impl RubricSource for TomlRubricSource {
    async fn load(&self, path: &Path) -> Result<Vec<RubricItem>> {
        Ok(load_rubric(path).await?)
    }
}
