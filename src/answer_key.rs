use std::{collections::BTreeMap, ops::Range};

use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

/// The correct answers of one subject, in question order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectKey {
    pub name: String,
    pub answers: Vec<usize>,
}

/// A versioned answer key.
///
/// Subjects keep the order they were given in. Concatenating their answers
/// gives the global question order `0..N`, subject-major, which is the same
/// order the bubble grid is laid out in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerKey {
    version: String,
    subjects: Vec<SubjectKey>,
}

impl AnswerKey {
    pub fn new<N, I>(version: impl Into<String>, subjects: I) -> Result<Self, ConfigurationError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Vec<usize>)>,
    {
        let subjects = subjects
            .into_iter()
            .map(|(name, answers)| SubjectKey {
                name: name.into(),
                answers,
            })
            .collect();
        Self::from_subjects(version, subjects)
    }

    pub fn from_subjects(
        version: impl Into<String>,
        subjects: Vec<SubjectKey>,
    ) -> Result<Self, ConfigurationError> {
        let version = version.into();
        if subjects.is_empty() {
            return Err(ConfigurationError::EmptyKey(version));
        }
        for (i, subject) in subjects.iter().enumerate() {
            if subject.answers.is_empty() {
                return Err(ConfigurationError::EmptySubject {
                    version,
                    subject: subject.name.clone(),
                });
            }
            if subjects[..i].iter().any(|it| it.name == subject.name) {
                return Err(ConfigurationError::DuplicateSubject {
                    version,
                    subject: subject.name.clone(),
                });
            }
        }
        Ok(Self { version, subjects })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn subjects(&self) -> &[SubjectKey] {
        &self.subjects
    }

    pub fn total_questions(&self) -> usize {
        self.subjects.iter().map(|it| it.answers.len()).sum()
    }

    /// Correct option per global question index.
    pub fn flattened(&self) -> Vec<usize> {
        self.subjects
            .iter()
            .flat_map(|it| it.answers.iter().copied())
            .collect()
    }

    /// Each subject with the contiguous range of global question indices it owns.
    pub fn subject_ranges(&self) -> impl Iterator<Item = (&SubjectKey, Range<usize>)> {
        self.subjects.iter().scan(0, |start, subject| {
            let range = *start..*start + subject.answers.len();
            *start = range.end;
            Some((subject, range))
        })
    }

    /// Fails if any correct answer does not exist on a sheet with `options` choices.
    pub fn check_options(&self, options: usize) -> Result<(), ConfigurationError> {
        for subject in &self.subjects {
            if let Some((question, &option)) = subject
                .answers
                .iter()
                .enumerate()
                .find(|(_, option)| **option >= options)
            {
                return Err(ConfigurationError::OptionOutOfRange {
                    subject: subject.name.clone(),
                    question,
                    option,
                    options,
                });
            }
        }
        Ok(())
    }
}

/// One `[keys.<version>]` table of a configuration file.
#[derive(Debug, Deserialize)]
pub struct KeyEntry {
    pub subjects: Vec<SubjectKey>,
}

/// Answer keys by version label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, KeyEntry>")]
pub struct AnswerKeySet {
    keys: BTreeMap<String, AnswerKey>,
}

impl AnswerKeySet {
    pub fn new(keys: impl IntoIterator<Item = AnswerKey>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.version.clone(), key))
                .collect(),
        }
    }

    /// Adds `key`, replacing any key with the same version.
    pub fn insert(&mut self, key: AnswerKey) -> Option<AnswerKey> {
        self.keys.insert(key.version.clone(), key)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn get(&self, version: &str) -> Result<&AnswerKey, ConfigurationError> {
        self.keys
            .get(version)
            .ok_or_else(|| ConfigurationError::UnknownVersion(version.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

impl TryFrom<BTreeMap<String, KeyEntry>> for AnswerKeySet {
    type Error = ConfigurationError;

    fn try_from(value: BTreeMap<String, KeyEntry>) -> Result<Self, Self::Error> {
        let keys = value
            .into_iter()
            .map(|(version, entry)| {
                let key = AnswerKey::from_subjects(version.clone(), entry.subjects)?;
                Ok((version, key))
            })
            .collect::<Result<_, ConfigurationError>>()?;
        Ok(Self { keys })
    }
}

/// Renders an option index the way it is printed on the sheet, `0 -> 'A'`.
pub fn option_label(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .and_then(|it| it.checked_add(b'A'))
        .filter(u8::is_ascii_uppercase)
        .map(char::from)
        .unwrap_or('?')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_subjects() -> AnswerKey {
        AnswerKey::new("A", [("Python", vec![0, 1, 2]), ("MySQL", vec![3, 2])]).unwrap()
    }

    #[test]
    fn flattening_is_subject_major() {
        let key = two_subjects();
        assert_eq!(key.flattened(), vec![0, 1, 2, 3, 2]);
        assert_eq!(key.total_questions(), 5);
    }

    #[test]
    fn subject_ranges_are_contiguous() {
        let key = two_subjects();
        let ranges = key
            .subject_ranges()
            .map(|(subject, range)| (subject.name.as_str(), range))
            .collect::<Vec<_>>();
        assert_eq!(ranges, vec![("Python", 0..3), ("MySQL", 3..5)]);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(
            AnswerKey::new("A", Vec::<(&str, Vec<usize>)>::new()),
            Err(ConfigurationError::EmptyKey("A".into()))
        );
        assert!(matches!(
            AnswerKey::new("A", [("Python", vec![])]),
            Err(ConfigurationError::EmptySubject { .. })
        ));
        assert!(matches!(
            AnswerKey::new("A", [("Python", vec![0]), ("Python", vec![1])]),
            Err(ConfigurationError::DuplicateSubject { .. })
        ));
    }

    #[test]
    fn option_range_is_checked() {
        let key = two_subjects();
        assert!(key.check_options(4).is_ok());
        assert_eq!(
            key.check_options(3),
            Err(ConfigurationError::OptionOutOfRange {
                subject: "MySQL".into(),
                question: 0,
                option: 3,
                options: 3,
            })
        );
    }

    #[test]
    fn key_set_lookup() {
        let set = AnswerKeySet::new([two_subjects()]);
        assert_eq!(set.versions().collect::<Vec<_>>(), vec!["A"]);
        assert!(set.get("A").is_ok());
        assert_eq!(
            set.get("Z"),
            Err(ConfigurationError::UnknownVersion("Z".into()))
        );
    }

    #[test]
    fn labels() {
        assert_eq!(option_label(0), 'A');
        assert_eq!(option_label(3), 'D');
        assert_eq!(option_label(25), 'Z');
        assert_eq!(option_label(26), '?');
    }
}
