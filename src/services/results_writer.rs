//! 结果写入服务 - 业务能力层
//!
//! 只负责"把会话结果追加到结果文件"能力，不关心流程

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::SessionResult;

/// 结果写入契约
///
/// 实现方自行保证并发会话写入时互不交错。
#[async_trait]
pub trait ResultsWriter: Send + Sync {
    async fn append(&self, result: &SessionResult) -> Result<PathBuf>;
}

const CSV_HEADER: &str =
    "graded_at,student_id,assignment_name,question_type,total_score,max_possible_score,grade,category_scores,overall_feedback";

/// 追加写入 CSV 的结果写入服务
///
/// 职责：
/// - 每个会话写一行
/// - 文件为空时先写表头
/// - 内部互斥锁串行化所有写入
pub struct CsvResultsWriter {
    results_file_path: PathBuf,
    lock: Mutex<()>,
}

impl CsvResultsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            results_file_path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn format_row(result: &SessionResult) -> String {
        let category_scores = result
            .evaluations
            .iter()
            .map(|e| format!("{}={}/{}", e.category, e.score, e.max_points))
            .collect::<Vec<_>>()
            .join("; ");

        let fields = [
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            result.student_id.clone(),
            result.assignment_name.clone(),
            result.question_type.to_string(),
            result.total_score.to_string(),
            result.max_possible_score.to_string(),
            result.grade.clone(),
            category_scores,
            result.overall_feedback.clone(),
        ];

        fields
            .iter()
            .map(|field| escape_csv_field(field))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[async_trait]
impl ResultsWriter for CsvResultsWriter {
    async fn append(&self, result: &SessionResult) -> Result<PathBuf> {
        let _guard = self.lock.lock().await;

        debug!(
            "写入评分结果: 学生 {} | 作业 {} | 总分 {}/{}",
            result.student_id, result.assignment_name, result.total_score, result.max_possible_score
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_file_path)
            .await
            .with_context(|| format!("无法打开结果文件: {}", self.results_file_path.display()))?;

        let mut buffer = String::new();
        if file.metadata().await?.len() == 0 {
            buffer.push_str(CSV_HEADER);
            buffer.push('\n');
        }
        buffer.push_str(&Self::format_row(result));
        buffer.push('\n');

        file.write_all(buffer.as_bytes())
            .await
            .with_context(|| format!("无法写入结果文件: {}", self.results_file_path.display()))?;
        file.flush().await?;

        Ok(self.results_file_path.clone())
    }
}

/// 含逗号、引号或换行的字段加引号，内部引号双写
fn escape_csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GradingEvaluation, QuestionType};
    use std::sync::Arc;

    fn session_result(student_id: &str) -> SessionResult {
        SessionResult {
            student_id: student_id.to_string(),
            assignment_name: "Essay 1".to_string(),
            question_type: QuestionType::Essay,
            total_score: 83,
            max_possible_score: 100,
            grade: "B".to_string(),
            overall_feedback: "Good work, \"mostly\" clear,\nkeep going".to_string(),
            evaluations: vec![
                GradingEvaluation::new("Content", 25, 30, "", "Good"),
                GradingEvaluation::new("Mechanics", 8, 10, "", "Good"),
            ],
        }
    }

    #[test]
    fn test_escape_csv_field() {
        assert_eq!(escape_csv_field("plain"), "plain");
        assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
        assert_eq!(escape_csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let writer = CsvResultsWriter::new(&path);

        let written = writer.append(&session_result("S1")).await.unwrap();
        assert_eq!(written, path);
        writer.append(&session_result("S2")).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("graded_at,student_id").count(), 1);
        assert!(content.contains(",S1,Essay 1,ESSAY,83,100,B,Content=25/30; Mechanics=8/10,"));
        assert!(content.contains("\"Good work, \"\"mostly\"\" clear,\nkeep going\""));
        assert!(content.contains(",S2,"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let writer = Arc::new(CsvResultsWriter::new(&path));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let writer = writer.clone();
                tokio::spawn(async move { writer.append(&session_result(&format!("S{}", i))).await })
            })
            .collect();
        for handle in handles {
            tokio_test::assert_ok!(handle.await.unwrap());
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("graded_at,student_id").count(), 1);
        for i in 0..20 {
            assert!(content.contains(&format!(",S{},Essay 1,", i)));
        }
    }

    #[tokio::test]
    async fn test_append_to_missing_directory_fails() {
        let writer = CsvResultsWriter::new("/nonexistent-dir/results.csv");
        assert!(writer.append(&session_result("S1")).await.is_err());
    }
}
