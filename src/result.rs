use std::fmt;

use serde::Serialize;

/// Fill intensities of every option of one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkObservation {
    pub intensities: Vec<f32>,
    /// First option holding the largest intensity.
    pub max_index: usize,
    pub max_value: f32,
}

impl MarkObservation {
    /// `None` for an empty intensity list.
    pub fn new(intensities: Vec<f32>) -> Option<Self> {
        let (&first, rest) = intensities.split_first()?;
        let (max_index, max_value) = rest
            .iter()
            .enumerate()
            .fold((0, first), |(best_index, best), (i, &value)| {
                if value > best {
                    (i + 1, value)
                } else {
                    (best_index, best)
                }
            });
        Some(Self {
            intensities,
            max_index,
            max_value,
        })
    }
}

/// Why a question could not be read. The question counts as unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellIssue {
    /// Some option cells fell outside the canonical frame.
    OutOfFrame,
    /// A cell produced an empty region.
    EmptyRegion,
}

impl fmt::Display for CellIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellIssue::OutOfFrame => f.write_str("cells outside the sheet"),
            CellIssue::EmptyRegion => f.write_str("empty cell region"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_index: usize,
    pub detected_option: Option<usize>,
    pub correct_option: usize,
    pub correct: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<MarkObservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<CellIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectScore {
    pub subject_name: String,
    pub correct_count: usize,
    pub max_count: usize,
}

impl SubjectScore {
    pub fn percentage(&self) -> f32 {
        percentage(self.correct_count, self.max_count)
    }
}

/// Degradations that did not stop the evaluation but make the score less
/// trustworthy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// No sheet outline was found and the full image was graded.
    pub sheet_fallback: bool,
    /// The perspective warp was degenerate and the image was graded unwarped.
    pub warp_fallback: bool,
    pub unreadable_questions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetEvaluationResult {
    pub version: String,
    pub per_question: Vec<QuestionResult>,
    pub per_subject: Vec<SubjectScore>,
    pub total_correct: usize,
    pub total_questions: usize,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreWarning {
    NoCorrectAnswers,
    VeryLowScore,
}

impl fmt::Display for ScoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreWarning::NoCorrectAnswers => f.write_str("No correct answers detected."),
            ScoreWarning::VeryLowScore => f.write_str("Very low score detected."),
        }
    }
}

const VERY_LOW_SCORE: usize = 5;

impl SheetEvaluationResult {
    pub fn percentage(&self) -> f32 {
        percentage(self.total_correct, self.total_questions)
    }

    /// One entry per question, `1` if correct.
    pub fn question_scores(&self) -> Vec<u8> {
        self.per_question.iter().map(|it| it.correct as u8).collect()
    }

    /// Correct answers per subject, in key order.
    pub fn subject_map(&self) -> Vec<(&str, usize)> {
        self.per_subject
            .iter()
            .map(|it| (it.subject_name.as_str(), it.correct_count))
            .collect()
    }

    pub fn unanswered(&self) -> impl Iterator<Item = &QuestionResult> {
        self.per_question
            .iter()
            .filter(|it| it.detected_option.is_none())
    }

    pub fn is_low_confidence(&self) -> bool {
        self.diagnostics.sheet_fallback
            || self.diagnostics.warp_fallback
            || !self.diagnostics.unreadable_questions.is_empty()
    }

    pub fn score_warning(&self) -> Option<ScoreWarning> {
        match self.total_correct {
            0 => Some(ScoreWarning::NoCorrectAnswers),
            n if n < VERY_LOW_SCORE => Some(ScoreWarning::VeryLowScore),
            _ => None,
        }
    }
}

fn percentage(correct: usize, max: usize) -> f32 {
    if max == 0 {
        0.0
    } else {
        correct as f32 * 100.0 / max as f32
    }
}
