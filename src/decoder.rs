use image::GrayImage;
use imageproc::{
    filter::{box_filter, gaussian_blur_f32},
    rect::Rect,
};
use tracing::instrument;

use crate::{
    grid::QuestionCells, util::crop_padded, CellIssue, EvaluationOptions, MarkObservation,
};

/// Outcome of reading one question off the canonical image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedQuestion {
    pub question_index: usize,
    pub detected_option: Option<usize>,
    pub observation: Option<MarkObservation>,
    pub issue: Option<CellIssue>,
}

impl DecodedQuestion {
    fn unreadable(question_index: usize, issue: CellIssue) -> Self {
        Self {
            question_index,
            detected_option: None,
            observation: None,
            issue: Some(issue),
        }
    }
}

/// The marked option, if the strongest one is filled past `fill_threshold`.
/// Equal maxima resolve to the lower option index.
pub fn decide(observation: &MarkObservation, fill_threshold: f32) -> Option<usize> {
    (observation.max_value > fill_threshold).then_some(observation.max_index)
}

/// Measures every option cell of `question` and picks the marked one.
///
/// Never fails: a question whose cells cannot be read is returned unanswered
/// with the reason attached.
#[instrument(level = "trace", skip_all, fields(question = question.question_index))]
pub fn decode_question(
    image: &GrayImage,
    question: &QuestionCells,
    options_per_question: usize,
    options: &EvaluationOptions,
) -> DecodedQuestion {
    let index = question.question_index;
    if question.cells.len() != options_per_question {
        log::warn!(
            "Question {}: only {} of {options_per_question} cells inside the sheet, marking unanswered",
            index + 1,
            question.cells.len()
        );
        return DecodedQuestion::unreadable(index, CellIssue::OutOfFrame);
    }

    let intensities = question
        .cells
        .iter()
        .map(|cell| fill_intensity(image, cell.rect, options))
        .collect::<Result<Vec<_>, _>>();
    let observation = match intensities.map(MarkObservation::new) {
        Ok(Some(observation)) => observation,
        Ok(None) => return DecodedQuestion::unreadable(index, CellIssue::EmptyRegion),
        Err(issue) => {
            log::warn!("Question {}: {issue}, marking unanswered", index + 1);
            return DecodedQuestion::unreadable(index, issue);
        }
    };

    let detected_option = decide(&observation, options.fill_threshold);
    match detected_option {
        Some(option) => log::trace!(
            "Q{}: detected option {option} (intensity {:.3})",
            index + 1,
            observation.max_value
        ),
        None => log::trace!(
            "Q{}: no clear answer (max intensity {:.3})",
            index + 1,
            observation.max_value
        ),
    }
    DecodedQuestion {
        question_index: index,
        detected_option,
        observation: Some(observation),
        issue: None,
    }
}

/// Fraction of `rect` covered by dark marks.
///
/// A pixel is foreground when it is at least `threshold_offset` darker than
/// the mean of the `(2r + 1)^2` window around it. The crop is padded by `r`
/// so the window sees the paper around the cell.
pub fn fill_intensity(
    image: &GrayImage,
    rect: Rect,
    options: &EvaluationOptions,
) -> Result<f32, CellIssue> {
    let radius = options.block_radius;
    let (crop, inner) = crop_padded(image, rect, radius).ok_or(CellIssue::EmptyRegion)?;
    let area = inner.width() * inner.height();
    if area == 0 {
        return Err(CellIssue::EmptyRegion);
    }

    let blurred = if options.cell_blur_sigma > 0.0 {
        gaussian_blur_f32(&crop, options.cell_blur_sigma)
    } else {
        crop
    };
    let local_mean = box_filter(&blurred, radius, radius);
    let offset = i16::from(options.threshold_offset);

    let mut filled = 0u32;
    for y in inner.top()..=inner.bottom() {
        for x in inner.left()..=inner.right() {
            let (x, y) = (x as u32, y as u32);
            let pixel = i16::from(blurred.get_pixel(x, y)[0]);
            let mean = i16::from(local_mean.get_pixel(x, y)[0]);
            if pixel <= mean - offset {
                filled += 1;
            }
        }
    }
    Ok(filled as f32 / area as f32)
}

#[cfg(test)]
mod tests {
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;

    use super::*;
    use crate::grid::BubbleCell;

    fn row(image_width: u32) -> (GrayImage, QuestionCells) {
        let image = GrayImage::from_pixel(image_width, 40, Luma([250]));
        let cells = (0..4)
            .map(|option| BubbleCell {
                question_index: 7,
                option_index: option,
                rect: Rect::at(10 + option as i32 * 35, 10).of_size(35, 20),
            })
            .collect();
        (
            image,
            QuestionCells {
                question_index: 7,
                subject_index: 0,
                cells,
            },
        )
    }

    fn fill(image: &mut GrayImage, option: i32) {
        draw_filled_rect_mut(
            image,
            Rect::at(10 + option * 35 + 4, 13).of_size(27, 14),
            Luma([20]),
        );
    }

    #[test]
    fn blank_row_is_unanswered() {
        let (image, question) = row(170);
        let decoded = decode_question(&image, &question, 4, &EvaluationOptions::default());
        assert_eq!(decoded.detected_option, None);
        assert_eq!(decoded.issue, None);
        let observation = decoded.observation.unwrap();
        assert!(observation.intensities.iter().all(|it| *it == 0.0));
    }

    #[test]
    fn filled_cell_is_detected() {
        let (mut image, question) = row(170);
        fill(&mut image, 2);
        let decoded = decode_question(&image, &question, 4, &EvaluationOptions::default());
        assert_eq!(decoded.question_index, 7);
        assert_eq!(decoded.detected_option, Some(2));
        let observation = decoded.observation.unwrap();
        assert!(observation.max_value > 0.3, "{observation:?}");
        assert_eq!(observation.intensities[0], 0.0);
    }

    #[test]
    fn faint_smudge_stays_below_threshold() {
        let (mut image, question) = row(170);
        draw_filled_rect_mut(&mut image, Rect::at(50, 15).of_size(2, 2), Luma([20]));
        let options = EvaluationOptions {
            fill_threshold: 0.05,
            ..EvaluationOptions::default()
        };
        let decoded = decode_question(&image, &question, 4, &options);
        assert_eq!(decoded.detected_option, None);
        assert!(decoded.observation.unwrap().max_value > 0.0);
    }

    #[test]
    fn ties_resolve_to_lower_option() {
        let observation = MarkObservation::new(vec![0.1, 0.5, 0.2, 0.5]).unwrap();
        assert_eq!(decide(&observation, 0.05), Some(1));
        let observation = MarkObservation::new(vec![0.3, 0.3, 0.3, 0.3]).unwrap();
        assert_eq!(decide(&observation, 0.05), Some(0));
    }

    #[test]
    fn threshold_is_strict() {
        let observation = MarkObservation::new(vec![0.05, 0.0]).unwrap();
        assert_eq!(decide(&observation, 0.05), None);
    }

    #[test]
    fn missing_cells_mark_question_unreadable() {
        let (image, mut question) = row(170);
        question.cells.pop();
        let decoded = decode_question(&image, &question, 4, &EvaluationOptions::default());
        assert_eq!(decoded.detected_option, None);
        assert_eq!(decoded.issue, Some(CellIssue::OutOfFrame));
        assert!(decoded.observation.is_none());
    }

    #[test]
    fn cell_outside_image_is_an_empty_region() {
        let image = GrayImage::from_pixel(20, 20, Luma([250]));
        let rect = Rect::at(40, 40).of_size(5, 5);
        assert_eq!(
            fill_intensity(&image, rect, &EvaluationOptions::default()),
            Err(CellIssue::EmptyRegion)
        );
    }

    #[test]
    fn uneven_lighting_does_not_read_as_a_mark() {
        // Horizontal shading from 250 down to 130 across the row.
        let image = GrayImage::from_fn(170, 40, |x, _| Luma([(250 - (x * 120 / 169)) as u8]));
        let (_, question) = row(170);
        let decoded = decode_question(&image, &question, 4, &EvaluationOptions::default());
        assert_eq!(decoded.detected_option, None, "{:?}", decoded.observation);
    }
}
