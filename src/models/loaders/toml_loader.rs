use crate::error::{AppError, AppResult};
use crate::models::{validate_rubric, RubricItem, SubmissionJob};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 评分表文件结构
#[derive(Debug, Deserialize)]
struct RubricFile {
    #[serde(default)]
    items: Vec<RubricItem>,
}

/// 从 TOML 文件加载评分表并校验
pub async fn load_rubric(toml_file_path: &Path) -> AppResult<Vec<RubricItem>> {
    let content = read_toml(toml_file_path).await?;

    let rubric: RubricFile = toml::from_str(&content)
        .map_err(|e| AppError::toml_parse(toml_file_path.display().to_string(), e))?;

    validate_rubric(&rubric.items)?;

    Ok(rubric.items)
}

/// 从 TOML 文件加载单份提交
pub async fn load_submission(toml_file_path: &Path) -> AppResult<SubmissionJob> {
    let content = read_toml(toml_file_path).await?;

    let job: SubmissionJob = toml::from_str(&content)
        .map_err(|e| AppError::toml_parse(toml_file_path.display().to_string(), e))?;

    job.validate()?;

    Ok(job)
}

async fn read_toml(toml_file_path: &Path) -> AppResult<String> {
    fs::read_to_string(toml_file_path)
        .await
        .map_err(|e| AppError::file(toml_file_path.display().to_string(), e))
}

/// 从文件夹中加载所有提交，无法加载的文件记录警告后跳过
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<SubmissionJob>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    // 保证批次顺序稳定
    paths.sort();

    let mut submissions = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_submission(&path).await {
            Ok(job) => {
                tracing::info!("成功加载 {} 的 {} 提交", job.student_id, job.question_type);
                submissions.push(job);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(submissions)
}
