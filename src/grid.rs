use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{AnswerKey, ConfigurationError};

/// Fixed bubble sheet template, in canonical frame pixels.
///
/// Subjects are columns, questions are rows within a column, and the options
/// of a question sit side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub subjects: u32,
    pub questions_per_subject: u32,
    pub options_per_question: u32,
    pub margin_left: u32,
    pub margin_top: u32,
    /// Vertical distance between consecutive questions.
    pub question_pitch: u32,
    /// Horizontal distance between consecutive subject columns.
    pub subject_pitch: u32,
    /// Horizontal distance between consecutive options of a question.
    pub option_pitch: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            subjects: 5,
            questions_per_subject: 20,
            options_per_question: 4,
            margin_left: 50,
            margin_top: 100,
            question_pitch: 30,
            subject_pitch: 145,
            option_pitch: 35,
            cell_width: 35,
            cell_height: 20,
        }
    }
}

impl LayoutConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("subjects", self.subjects),
            ("questions_per_subject", self.questions_per_subject),
            ("options_per_question", self.options_per_question),
            ("cell_width", self.cell_width),
            ("cell_height", self.cell_height),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigurationError::ZeroLayoutField(*name));
        }
        if self.required_extent().is_none() {
            return Err(ConfigurationError::LayoutTooLarge);
        }
        if self.options_per_question > 1 && self.option_pitch < self.cell_width {
            return Err(ConfigurationError::OverlappingCells {
                pitch: self.option_pitch,
                width: self.cell_width,
            });
        }
        Ok(())
    }

    /// Fails unless `key` has one subject per column and one answer per row.
    pub fn check_key(&self, key: &AnswerKey) -> Result<(), ConfigurationError> {
        let subjects = key.subjects();
        if subjects.len() != self.subjects as usize {
            return Err(ConfigurationError::SubjectCountMismatch {
                version: key.version().to_string(),
                layout: self.subjects as usize,
                key: subjects.len(),
            });
        }
        if let Some(subject) = subjects
            .iter()
            .find(|it| it.answers.len() != self.questions_per_subject as usize)
        {
            return Err(ConfigurationError::QuestionCountMismatch {
                subject: subject.name.clone(),
                layout: self.questions_per_subject as usize,
                key: subject.answers.len(),
            });
        }
        key.check_options(self.options_per_question as usize)
    }

    pub fn total_questions(&self) -> usize {
        self.subjects as usize * self.questions_per_subject as usize
    }

    pub fn cell_count(&self) -> usize {
        self.total_questions() * self.options_per_question as usize
    }

    /// Smallest canonical frame that holds every cell unclipped, `None` when
    /// it exceeds pixel coordinates.
    pub fn required_extent(&self) -> Option<(u32, u32)> {
        let width = self
            .subjects
            .saturating_sub(1)
            .checked_mul(self.subject_pitch)?
            .checked_add(
                self.options_per_question
                    .saturating_sub(1)
                    .checked_mul(self.option_pitch)?,
            )?
            .checked_add(self.margin_left)?
            .checked_add(self.cell_width)?;
        let height = self
            .questions_per_subject
            .saturating_sub(1)
            .checked_mul(self.question_pitch)?
            .checked_add(self.margin_top)?
            .checked_add(self.cell_height)?;
        let limit = i32::MAX as u32;
        (width <= limit && height <= limit).then_some((width, height))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BubbleCell {
    pub question_index: usize,
    pub option_index: usize,
    pub rect: Rect,
}

/// The option cells of one question that landed inside the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCells {
    pub question_index: usize,
    pub subject_index: usize,
    pub cells: Vec<BubbleCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BubbleGrid {
    pub questions: Vec<QuestionCells>,
}

impl BubbleGrid {
    pub fn cell_count(&self) -> usize {
        self.questions.iter().map(|it| it.cells.len()).sum()
    }

    pub fn cells(&self) -> impl Iterator<Item = &BubbleCell> {
        self.questions.iter().flat_map(|it| it.cells.iter())
    }
}

/// Lays out every cell of `layout` on a `width x height` canonical frame.
///
/// Questions are ordered subject-major. Cells are clipped to the frame and
/// dropped when nothing of them remains, so a question near the edge may
/// come back with fewer cells than it has options.
#[instrument(level = "debug", skip(layout))]
pub fn map_grid(layout: &LayoutConfig, width: u32, height: u32) -> BubbleGrid {
    let has_area = layout.cell_width > 0 && layout.cell_height > 0;
    let frame = (width > 0 && height > 0 && has_area).then(|| Rect::at(0, 0).of_size(width, height));
    let mut questions = Vec::with_capacity(layout.total_questions());

    for subject in 0..layout.subjects {
        let column = layout.margin_left as i64 + subject as i64 * layout.subject_pitch as i64;
        for question in 0..layout.questions_per_subject {
            let question_index = questions.len();
            let y = layout.margin_top as i64 + question as i64 * layout.question_pitch as i64;
            let cells = (0..layout.options_per_question)
                .filter_map(|option| {
                    let frame = frame?;
                    let x = column + option as i64 * layout.option_pitch as i64;
                    let (left, top) = (i32::try_from(x).ok()?, i32::try_from(y).ok()?);
                    left.checked_add_unsigned(layout.cell_width)?;
                    top.checked_add_unsigned(layout.cell_height)?;
                    let rect = Rect::at(left, top)
                        .of_size(layout.cell_width, layout.cell_height)
                        .intersect(frame)?;
                    Some(BubbleCell {
                        question_index,
                        option_index: option as usize,
                        rect,
                    })
                })
                .collect::<Vec<_>>();
            if cells.len() < layout.options_per_question as usize {
                log::debug!(
                    "Question {question_index} has {} of {} cells inside the {width}x{height} frame",
                    cells.len(),
                    layout.options_per_question
                );
            }
            questions.push(QuestionCells {
                question_index,
                subject_index: subject as usize,
                cells,
            });
        }
    }

    BubbleGrid { questions }
}
