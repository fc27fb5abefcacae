//! 评分表数据结构
//!
//! 评分表在会话开始时加载一次，之后只读，可以通过 `Arc` 在所有工作者之间共享。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::RubricError;

/// 评分档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandLevel {
    Excellent,
    Good,
    Fair,
    NeedsImprovement,
}

impl BandLevel {
    pub fn label(&self) -> &'static str {
        match self {
            BandLevel::Excellent => "Excellent",
            BandLevel::Good => "Good",
            BandLevel::Fair => "Fair",
            BandLevel::NeedsImprovement => "Needs Improvement",
        }
    }
}

impl fmt::Display for BandLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// TOML 中的档位定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSpec {
    pub description: String,
    /// 该档位的分数上限
    pub points: u32,
}

/// 传给评估器的档位（已带上档位名称）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBand {
    pub level: BandLevel,
    pub description: String,
    pub points: u32,
}

/// 评分项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricItem {
    /// 评分维度名称，在一个评分表内唯一
    pub category: String,
    pub description: String,
    pub max_points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excellent: Option<BandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<BandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fair: Option<BandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_improvement: Option<BandSpec>,
}

impl RubricItem {
    pub fn new(category: impl Into<String>, description: impl Into<String>, max_points: u32) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
            max_points,
            excellent: None,
            good: None,
            fair: None,
            needs_improvement: None,
        }
    }

    /// 设置某个档位
    pub fn with_band(mut self, level: BandLevel, description: impl Into<String>, points: u32) -> Self {
        let band = Some(BandSpec {
            description: description.into(),
            points,
        });
        match level {
            BandLevel::Excellent => self.excellent = band,
            BandLevel::Good => self.good = band,
            BandLevel::Fair => self.fair = band,
            BandLevel::NeedsImprovement => self.needs_improvement = band,
        }
        self
    }

    /// 构建档位集合，跳过未定义的档位
    pub fn bands(&self) -> Vec<ScoreBand> {
        [
            (BandLevel::Excellent, &self.excellent),
            (BandLevel::Good, &self.good),
            (BandLevel::Fair, &self.fair),
            (BandLevel::NeedsImprovement, &self.needs_improvement),
        ]
        .into_iter()
        .filter_map(|(level, spec)| {
            spec.as_ref().map(|s| ScoreBand {
                level,
                description: s.description.clone(),
                points: s.points,
            })
        })
        .collect()
    }
}

/// 校验整张评分表
pub fn validate_rubric(items: &[RubricItem]) -> Result<(), RubricError> {
    if items.is_empty() {
        return Err(RubricError::Empty);
    }

    let mut seen = HashSet::new();
    for (index, item) in items.iter().enumerate() {
        if item.category.trim().is_empty() {
            return Err(RubricError::MissingCategory { index: index + 1 });
        }
        if !seen.insert(item.category.as_str()) {
            return Err(RubricError::DuplicateCategory {
                category: item.category.clone(),
            });
        }
        if item.max_points == 0 {
            return Err(RubricError::NonPositiveMaxPoints {
                category: item.category.clone(),
            });
        }
        for band in item.bands() {
            if band.points > item.max_points {
                return Err(RubricError::BandExceedsMax {
                    category: item.category.clone(),
                    band: band.level.to_string(),
                    points: band.points,
                    max_points: item.max_points,
                });
            }
        }
    }

    Ok(())
}
