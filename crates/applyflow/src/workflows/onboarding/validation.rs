use std::collections::BTreeMap;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::domain::{CandidateField, CandidateRecord};

/// Minimum number of whitespace-separated words in the motivation text.
pub const MIN_MOTIVATION_WORDS: usize = 30;

const NATIONAL_ID_DIGITS: usize = 11;

/// Reason a single field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Required,
    TooShort { minimum: usize, found: usize },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Required => write!(f, "this field is required"),
            FieldError::TooShort { minimum, found } => {
                write!(f, "minimum of {minimum} words (found {found})")
            }
        }
    }
}

/// Field-level validation results. An absent field is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(BTreeMap<CandidateField, FieldError>);

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: CandidateField) -> Option<FieldError> {
        self.0.get(&field).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = CandidateField> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CandidateField, FieldError)> + '_ {
        self.0.iter().map(|(field, error)| (*field, *error))
    }

    fn record(&mut self, field: CandidateField, error: FieldError) {
        self.0.insert(field, error);
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, error) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {error}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for ValidationErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, error) in &self.0 {
            map.serialize_entry(field, &error.to_string())?;
        }
        map.end()
    }
}

/// Validate a candidate record. Pure; the full error set is rebuilt on every call.
pub fn validate(record: &CandidateRecord) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    for field in CandidateField::ordered() {
        if field.is_required() && record.value(field).trim().is_empty() {
            errors.record(field, FieldError::Required);
        }
    }

    // Word count wins over the required check for the motivation field.
    let found = word_count(&record.motivation_text);
    if found < MIN_MOTIVATION_WORDS {
        errors.record(
            CandidateField::MotivationText,
            FieldError::TooShort {
                minimum: MIN_MOTIVATION_WORDS,
                found,
            },
        );
    }

    errors
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Group national-id digits as `XXX.XXX.XXX-XX`, ignoring any other characters.
///
/// Partial input is grouped progressively so the transform can run on every keystroke.
pub fn format_national_id(raw: &str) -> String {
    let digits: Vec<char> = raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(NATIONAL_ID_DIGITS)
        .collect();

    let mut formatted = String::with_capacity(NATIONAL_ID_DIGITS + 3);
    for (index, digit) in digits.iter().enumerate() {
        match index {
            3 | 6 => formatted.push('.'),
            9 => formatted.push('-'),
            _ => {}
        }
        formatted.push(*digit);
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        vec!["word"; count].join(" ")
    }

    fn complete_record() -> CandidateRecord {
        CandidateRecord {
            name: "Marina Costa".to_string(),
            national_id: "123.456.789-09".to_string(),
            email: "marina@example.com".to_string(),
            phone: "+55 11 91234-5678".to_string(),
            address: "Rua das Flores 120, Sao Paulo".to_string(),
            prior_experience: None,
            motivation_text: words(MIN_MOTIVATION_WORDS),
        }
    }

    #[test]
    fn complete_record_has_no_errors() {
        assert!(validate(&complete_record()).is_empty());
    }

    #[test]
    fn twenty_nine_words_is_too_short() {
        let mut record = complete_record();
        record.motivation_text = words(MIN_MOTIVATION_WORDS - 1);

        let errors = validate(&record);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(CandidateField::MotivationText),
            Some(FieldError::TooShort {
                minimum: 30,
                found: 29
            })
        );
    }

    #[test]
    fn irregular_whitespace_does_not_inflate_word_count() {
        let mut record = complete_record();
        record.motivation_text = format!("  {}  \n\t ", words(29).replace(' ', "   "));
        assert_eq!(word_count(&record.motivation_text), 29);
        assert!(validate(&record)
            .get(CandidateField::MotivationText)
            .is_some());
    }

    #[test]
    fn missing_fields_are_reported_individually() {
        let mut record = complete_record();
        record.email = "   ".to_string();
        record.address.clear();

        let errors = validate(&record);
        let fields: Vec<_> = errors.fields().collect();
        assert_eq!(fields, vec![CandidateField::Email, CandidateField::Address]);
        assert_eq!(errors.get(CandidateField::Email), Some(FieldError::Required));
    }

    #[test]
    fn empty_motivation_reports_word_count_instead_of_required() {
        let mut record = complete_record();
        record.motivation_text.clear();

        let errors = validate(&record);
        assert_eq!(
            errors.get(CandidateField::MotivationText),
            Some(FieldError::TooShort {
                minimum: 30,
                found: 0
            })
        );
    }

    #[test]
    fn prior_experience_is_optional() {
        let record = complete_record();
        assert!(validate(&record)
            .get(CandidateField::PriorExperience)
            .is_none());
    }

    #[test]
    fn serializes_as_field_message_map() {
        let mut record = complete_record();
        record.name.clear();

        let value = serde_json::to_value(validate(&record)).expect("serializes");
        assert_eq!(value["name"], "this field is required");
    }

    #[test]
    fn formats_national_id_progressively() {
        assert_eq!(format_national_id(""), "");
        assert_eq!(format_national_id("123"), "123");
        assert_eq!(format_national_id("1234"), "123.4");
        assert_eq!(format_national_id("1234567890"), "123.456.789-0");
        assert_eq!(format_national_id("12345678909"), "123.456.789-09");
        assert_eq!(format_national_id("123456789099999"), "123.456.789-09");
    }

    #[test]
    fn national_id_formatting_is_idempotent() {
        let once = format_national_id("abc 123-456 789.09");
        assert_eq!(once, "123.456.789-09");
        assert_eq!(format_national_id(&once), once);
    }
}
