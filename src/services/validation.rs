use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{PatientData, PatientForm};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").unwrap()
});
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").unwrap());

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 100;

/// Field name to a single human-readable message, ordered for stable
/// rendering. A non-empty map means the whole form was rejected.
pub type FieldErrors = BTreeMap<&'static str, String>;

/// Validates the identity form as a whole. Either every field passes and a
/// PatientData comes back, or nothing is kept and the caller gets the full
/// error map.
pub fn validate_patient_form(form: &PatientForm) -> Result<PatientData, FieldErrors> {
    let mut errors = FieldErrors::new();

    let full_name = collapse_whitespace(form.full_name.trim());
    let name_len = full_name.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&name_len) {
        errors.insert(
            "full_name",
            format!("El nombre debe tener entre {NAME_MIN} y {NAME_MAX} caracteres."),
        );
    } else if !full_name.chars().all(|c| c.is_alphabetic() || c == ' ') {
        errors.insert(
            "full_name",
            "El nombre solo puede contener letras y espacios.".to_string(),
        );
    }

    let phone = form.phone.trim();
    if !DIGITS_RE.is_match(phone) || !(9..=15).contains(&phone.len()) {
        errors.insert(
            "phone",
            "El teléfono debe tener entre 9 y 15 dígitos, sin espacios ni símbolos.".to_string(),
        );
    }

    if form.document_type.trim().is_empty() {
        errors.insert(
            "document_type",
            "Selecciona un tipo de documento.".to_string(),
        );
    }

    let document_number = form.document_number.trim();
    if !DIGITS_RE.is_match(document_number) || !(8..=15).contains(&document_number.len()) {
        errors.insert(
            "document_number",
            "El número de documento debe tener entre 8 y 15 dígitos.".to_string(),
        );
    }

    let verification_digit = match form.verification_digit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(d) if d.len() == 1 && DIGITS_RE.is_match(d) => Some(d.to_string()),
        Some(_) => {
            errors.insert(
                "verification_digit",
                "El dígito de verificación es un solo número.".to_string(),
            );
            None
        }
    };

    let email = form.email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        errors.insert(
            "email",
            "Ingresa un correo electrónico válido.".to_string(),
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PatientData {
        full_name,
        phone: phone.to_string(),
        document_type: form.document_type.trim().to_string(),
        document_number: document_number.to_string(),
        verification_digit,
        email,
        patient_type: None,
        appointment_kind: None,
        referring_specialty: None,
    })
}

/// Strips characters that could carry markup into stored text.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&'))
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
