use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// フォーム入力などローカルで検出されるバリデーション失敗理由。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValidationFailureKind {
    /// 汎用的なバリデーションエラー。
    Generic,
    /// 必須項目が空。
    Required,
    /// 最小長に満たない。
    TooShort,
    /// 最大長を超過。
    TooLong,
    /// 書式が不正（メールアドレス、ユーザー名など）。
    InvalidFormat,
    /// 確認入力が一致しない。
    Mismatch,
    /// サポート外のメディア種別。
    UnsupportedMedia,
    /// メディアサイズや再生時間が上限を超過。
    ContentTooLarge,
}

impl ValidationFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailureKind::Generic => "generic",
            ValidationFailureKind::Required => "required",
            ValidationFailureKind::TooShort => "too_short",
            ValidationFailureKind::TooLong => "too_long",
            ValidationFailureKind::InvalidFormat => "invalid_format",
            ValidationFailureKind::Mismatch => "mismatch",
            ValidationFailureKind::UnsupportedMedia => "unsupported_media",
            ValidationFailureKind::ContentTooLarge => "content_too_large",
        }
    }
}

impl fmt::Display for ValidationFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationFailureKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generic" => Ok(ValidationFailureKind::Generic),
            "required" => Ok(ValidationFailureKind::Required),
            "too_short" => Ok(ValidationFailureKind::TooShort),
            "too_long" => Ok(ValidationFailureKind::TooLong),
            "invalid_format" => Ok(ValidationFailureKind::InvalidFormat),
            "mismatch" => Ok(ValidationFailureKind::Mismatch),
            "unsupported_media" => Ok(ValidationFailureKind::UnsupportedMedia),
            "content_too_large" => Ok(ValidationFailureKind::ContentTooLarge),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub kind: ValidationFailureKind,
    pub message: String,
}

/// Field-scoped validation failures collected before any network call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(
        field: impl Into<String>,
        kind: ValidationFailureKind,
        message: impl Into<String>,
    ) -> Self {
        let mut errors = Self::new();
        errors.push(field, kind, message);
        errors
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        kind: ValidationFailureKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn for_field(&self, field: &str) -> Option<&FieldError> {
        self.errors.iter().find(|error| error.field == field)
    }

    /// Ok when nothing was collected.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .errors
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

/// Trims `value` and checks its character count against `min..=max`.
pub fn check_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(
            field,
            ValidationFailureKind::Required,
            format!("{field} is required"),
        );
        return None;
    }
    let length = trimmed.chars().count();
    if length < min {
        errors.push(
            field,
            ValidationFailureKind::TooShort,
            format!("{field} must be at least {min} characters"),
        );
        return None;
    }
    if length > max {
        errors.push(
            field,
            ValidationFailureKind::TooLong,
            format!("{field} must be at most {max} characters"),
        );
        return None;
    }
    Some(trimmed.to_string())
}

pub fn check_email(errors: &mut ValidationErrors, field: &str, value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, ValidationFailureKind::Required, "Email is required");
        return None;
    }
    if !looks_like_email(trimmed) {
        errors.push(
            field,
            ValidationFailureKind::InvalidFormat,
            "Email address is not valid",
        );
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

fn looks_like_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty()
        && !value.contains(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_text_trims_and_bounds() {
        let mut errors = ValidationErrors::new();
        assert_eq!(
            check_text(&mut errors, "content", "  hi  ", 1, 10).as_deref(),
            Some("hi")
        );
        assert!(errors.is_empty());

        assert!(check_text(&mut errors, "content", "   ", 1, 10).is_none());
        assert!(check_text(&mut errors, "caption", "abcdef", 1, 3).is_none());
        assert_eq!(
            errors.for_field("content").map(|e| e.kind),
            Some(ValidationFailureKind::Required)
        );
        assert_eq!(
            errors.for_field("caption").map(|e| e.kind),
            Some(ValidationFailureKind::TooLong)
        );
    }

    #[test]
    fn check_email_accepts_and_normalizes() {
        let mut errors = ValidationErrors::new();
        assert_eq!(
            check_email(&mut errors, "email", " Ada@Example.com ").as_deref(),
            Some("ada@example.com")
        );
        assert!(check_email(&mut errors, "email", "not-an-email").is_none());
        assert!(check_email(&mut errors, "email", "a@b.").is_none());
        assert_eq!(errors.errors().len(), 2);
        assert!(errors.into_result().is_err());
    }

    #[test]
    fn failure_kind_round_trips_through_str() {
        for kind in [
            ValidationFailureKind::Generic,
            ValidationFailureKind::Mismatch,
            ValidationFailureKind::ContentTooLarge,
        ] {
            assert_eq!(kind.as_str().parse::<ValidationFailureKind>(), Ok(kind));
        }
    }
}
