//! 选择题判分 - 业务能力层
//!
//! 不依赖任何评估器，结果完全由学生作答与标准答案决定。
//!
//! ## 解析规则
//! - `Question <n>:` 开始一道新题
//! - 兼容旧格式：同一行出现 `A.` `B.` `C.` `D.` 也开始一道新题，
//!   但当前题目由 `Question <n>:` 开始时，该行只是它的选项
//! - 题目开始后、答案行出现前的非空行都拼接到题干
//! - `Answer: <A-D>`（不区分大小写）结束当前题目
//! - `Answer:` 后为空，记为明确的空答案
//! - 输入结束时仍未作答的题目记为空答案
//!
//! 空答案一律判错，不会被跳过，也不会与任何标准答案相等。

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// 解析出的一道题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuestion {
    /// 题目序号（从 1 开始，按出现顺序）
    pub number: usize,
    pub text: String,
    /// `None` 表示未作答
    pub answer: Option<char>,
}

/// 单题判分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionResult {
    pub number: usize,
    pub student_answer: Option<char>,
    pub correct_answer: Option<char>,
    pub is_correct: bool,
}

/// 整份选择题的判分结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McqOutcome {
    pub correct: usize,
    pub total: usize,
    pub results: Vec<QuestionResult>,
}

impl McqOutcome {
    /// 按满分折算：`round(correct / total * max_points)`
    pub fn scaled_score(&self, max_points: u32) -> u32 {
        if self.total == 0 {
            return 0;
        }
        (self.correct as f64 / self.total as f64 * max_points as f64).round() as u32
    }

    /// 逐题反馈
    pub fn feedback(&self) -> String {
        let mut lines = vec![format!(
            "Score: {}/{} questions correct.",
            self.correct, self.total
        )];

        for result in &self.results {
            let verdict = if result.is_correct { "Correct" } else { "Incorrect" };
            let student = result
                .student_answer
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no answer provided".to_string());
            let correct = result
                .correct_answer
                .map(|c| c.to_string())
                .unwrap_or_else(|| "not specified".to_string());
            lines.push(format!(
                "Question {}: {}. Your answer: {}. Correct answer: {}.",
                result.number, verdict, student, correct
            ));
        }

        lines.join("\n")
    }
}

/// 选择题判分器
pub struct McqScorer {
    question_re: Regex,
    answer_re: Regex,
}

impl McqScorer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            question_re: Regex::new(r"(?i)^question\s*\d+\s*:")?,
            answer_re: Regex::new(r"(?i)^answer\s*:\s*(.*)$")?,
        })
    }

    /// 把作答文本解析为有序的题目列表
    pub fn parse(&self, text: &str) -> Vec<ParsedQuestion> {
        let mut questions = Vec::new();
        let mut current: Option<ParsedQuestion> = None;
        // 当前题目是否由 `Question <n>:` 开始
        let mut opened_by_header = false;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = self.answer_re.captures(line) {
                let rest = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                match current.take() {
                    Some(mut question) => {
                        question.answer = parse_choice(rest);
                        questions.push(question);
                    }
                    None => debug!("忽略没有对应题目的答案行: {}", line),
                }
                continue;
            }

            let is_header = self.question_re.is_match(line);
            let opens_question = is_header
                || (is_legacy_option_line(line) && !(current.is_some() && opened_by_header));
            if opens_question {
                // 上一题没有答案行，记为空答案
                if let Some(question) = current.take() {
                    questions.push(question);
                }
                current = Some(ParsedQuestion {
                    number: questions.len() + 1,
                    text: line.to_string(),
                    answer: None,
                });
                opened_by_header = is_header;
                continue;
            }

            if let Some(question) = current.as_mut() {
                question.text.push('\n');
                question.text.push_str(line);
            }
        }

        if let Some(question) = current.take() {
            questions.push(question);
        }

        questions
    }

    /// 对比学生作答与标准答案
    ///
    /// 优先按题干匹配，题干对不上时按题目顺序匹配。标准答案中没有题目时返回错误。
    pub fn score(&self, submission: &str, answer_key: &str) -> Result<McqOutcome> {
        let key = self.parse(answer_key);
        if key.is_empty() {
            anyhow::bail!("标准答案中没有解析到任何题目");
        }

        let student = self.parse(submission);
        let mut by_text: HashMap<String, &ParsedQuestion> = HashMap::new();
        for question in &student {
            by_text.entry(normalize(&question.text)).or_insert(question);
        }

        let mut results = Vec::with_capacity(key.len());
        for (index, expected) in key.iter().enumerate() {
            let student_answer = by_text
                .get(&normalize(&expected.text))
                .copied()
                .or_else(|| student.get(index))
                .and_then(|q| q.answer);

            let is_correct = matches!(
                (student_answer, expected.answer),
                (Some(given), Some(correct)) if given == correct
            );

            results.push(QuestionResult {
                number: expected.number,
                student_answer,
                correct_answer: expected.answer,
                is_correct,
            });
        }

        let correct = results.iter().filter(|r| r.is_correct).count();
        debug!("选择题判分完成: {}/{}", correct, key.len());

        Ok(McqOutcome {
            correct,
            total: key.len(),
            results,
        })
    }
}

/// 解析答案行中的选项，只接受 A-D
fn parse_choice(rest: &str) -> Option<char> {
    let mut chars = rest.trim().chars();
    let first = chars.next()?.to_ascii_uppercase();
    let standalone = chars.next().map_or(true, |c| !c.is_alphanumeric());
    (matches!(first, 'A'..='D') && standalone).then_some(first)
}

fn is_legacy_option_line(line: &str) -> bool {
    ["A.", "B.", "C.", "D."].iter().all(|marker| line.contains(marker))
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
