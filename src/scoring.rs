use tracing::instrument;

use crate::{
    decoder::DecodedQuestion, AnswerKey, ConfigurationError, Diagnostics, QuestionResult,
    SheetEvaluationResult, SubjectScore,
};

/// Scores bare detected options against `key`, question by question in
/// global order.
pub fn score_answers(
    detected: &[Option<usize>],
    key: &AnswerKey,
) -> Result<SheetEvaluationResult, ConfigurationError> {
    let decoded = detected
        .iter()
        .enumerate()
        .map(|(question_index, &detected_option)| DecodedQuestion {
            question_index,
            detected_option,
            observation: None,
            issue: None,
        })
        .collect();
    score(decoded, key)
}

/// Compares decoded questions with `key` and totals them per subject.
///
/// `decoded` must follow the key's flattened, subject-major question order.
#[instrument(level = "debug", skip_all, fields(version = key.version()))]
pub fn score(
    decoded: Vec<DecodedQuestion>,
    key: &AnswerKey,
) -> Result<SheetEvaluationResult, ConfigurationError> {
    let flat = key.flattened();
    if decoded.len() != flat.len() {
        return Err(ConfigurationError::DecodedCountMismatch {
            decoded: decoded.len(),
            key: flat.len(),
        });
    }

    let per_question = decoded
        .into_iter()
        .zip(flat)
        .map(|(question, correct_option)| QuestionResult {
            question_index: question.question_index,
            correct: question.detected_option == Some(correct_option),
            detected_option: question.detected_option,
            correct_option,
            observation: question.observation,
            issue: question.issue,
        })
        .collect::<Vec<_>>();

    let per_subject = key
        .subject_ranges()
        .map(|(subject, range)| SubjectScore {
            subject_name: subject.name.clone(),
            correct_count: per_question[range.clone()]
                .iter()
                .filter(|it| it.correct)
                .count(),
            max_count: range.len(),
        })
        .collect::<Vec<_>>();

    let total_correct = per_subject.iter().map(|it| it.correct_count).sum();
    let total_questions = per_question.len();
    let unreadable_questions = per_question
        .iter()
        .filter(|it| it.issue.is_some())
        .map(|it| it.question_index)
        .collect();

    for subject in &per_subject {
        log::debug!(
            "{}: {}/{}",
            subject.subject_name,
            subject.correct_count,
            subject.max_count
        );
    }
    log::debug!("Total correct: {total_correct}/{total_questions}");

    Ok(SheetEvaluationResult {
        version: key.version().to_string(),
        per_question,
        per_subject,
        total_correct,
        total_questions,
        diagnostics: Diagnostics {
            unreadable_questions,
            ..Diagnostics::default()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellIssue;

    fn python_and_sql() -> AnswerKey {
        AnswerKey::new(
            "A",
            [("Python", vec![0, 1, 2, 3]), ("MySQL", vec![2, 3, 0, 1])],
        )
        .unwrap()
    }

    #[test]
    fn perfect_sheet() {
        let key = python_and_sql();
        let detected = key.flattened().into_iter().map(Some).collect::<Vec<_>>();
        let result = score_answers(&detected, &key).unwrap();
        assert_eq!(result.total_correct, 8);
        assert_eq!(result.total_questions, 8);
        assert_eq!(result.question_scores(), vec![1; 8]);
        assert_eq!(result.subject_map(), vec![("Python", 4), ("MySQL", 4)]);
        assert_eq!(result.score_warning(), None);
    }

    #[test]
    fn unanswered_is_never_correct() {
        let key = python_and_sql();
        let result = score_answers(&[None; 8], &key).unwrap();
        assert_eq!(result.total_correct, 0);
        assert!(result.per_question.iter().all(|it| !it.correct));
        assert_eq!(result.unanswered().count(), 8);
        assert_eq!(
            result.score_warning(),
            Some(crate::ScoreWarning::NoCorrectAnswers)
        );
    }

    #[test]
    fn subject_totals_follow_key_order() {
        let key = python_and_sql();
        // Python: questions 1 and 2 marked 0 and 1, only the first two match.
        let detected = [
            Some(0),
            Some(1),
            Some(0),
            None,
            Some(2),
            Some(0),
            Some(0),
            Some(3),
        ];
        let result = score_answers(&detected, &key).unwrap();
        assert_eq!(result.per_subject[0].subject_name, "Python");
        assert_eq!(result.per_subject[0].correct_count, 2);
        assert_eq!(result.per_subject[0].max_count, 4);
        assert_eq!(result.per_subject[1].correct_count, 2);
        assert_eq!(result.total_correct, 4);
        assert_eq!(result.question_scores(), vec![1, 1, 0, 0, 1, 0, 1, 0]);
        assert_eq!(result.per_question[3].correct_option, 3);
    }

    #[test]
    fn one_mismatch_in_a_pair() {
        let key = python_and_sql();
        let detected = [Some(0), Some(2), None, None, None, None, None, None];
        let result = score_answers(&detected, &key).unwrap();
        assert_eq!(result.per_subject[0].correct_count, 1);
    }

    #[test]
    fn length_mismatch_is_a_configuration_error() {
        let key = python_and_sql();
        assert_eq!(
            score_answers(&[Some(0); 3], &key),
            Err(ConfigurationError::DecodedCountMismatch { decoded: 3, key: 8 })
        );
    }

    #[test]
    fn unreadable_questions_are_reported() {
        let key = python_and_sql();
        let mut decoded = (0..8)
            .map(|question_index| DecodedQuestion {
                question_index,
                detected_option: None,
                observation: None,
                issue: None,
            })
            .collect::<Vec<_>>();
        decoded[5].issue = Some(CellIssue::EmptyRegion);
        let result = score(decoded, &key).unwrap();
        assert_eq!(result.diagnostics.unreadable_questions, vec![5]);
        assert!(result.is_low_confidence());
    }

    #[test]
    fn totals_stay_within_bounds() {
        let key = python_and_sql();
        for seed in 0..16usize {
            let detected = (0..8)
                .map(|i| ((seed + i) % 3 != 0).then_some((seed * 7 + i) % 4))
                .collect::<Vec<_>>();
            let result = score_answers(&detected, &key).unwrap();
            assert!(result.total_correct <= result.total_questions);
            assert_eq!(result.total_questions, key.total_questions());
            assert_eq!(
                result.per_subject.iter().map(|it| it.correct_count).sum::<usize>(),
                result.total_correct
            );
        }
    }
}
