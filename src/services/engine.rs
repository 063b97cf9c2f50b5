//! Pure transition core of the appointment flow. Every event, user input
//! and effect completion alike, goes through [`handle`], which mutates the
//! conversation and hands back messages plus the effects the runner must
//! perform. Nothing in here touches the network or the session timer.

use base64::{engine::general_purpose, Engine as _};

use crate::config::AppConfig;
use crate::models::catalog::{dedupe_doctors, group_by_doctor, site_address, DateStatus};
use crate::models::{
    Action, AppointmentKind, BotMessage, Choice, Conversation, DateEntry, Doctor, DoctorSlots,
    Effect, Event, ExtractedIntent, HourRange, Intent, PatientForm, PatientType, SearchMethod,
    Shift, SlotRecord, Specialty, Step, UiEvent,
};
use crate::models::{BookingReceipt, BookingRequest};
use crate::services::validation::{sanitize_text, validate_patient_form, FieldErrors};

pub const OBSERVATION_MAX_CHARS: usize = 100;
const ATTACHMENT_MAX_BYTES: usize = 1024 * 1024;

/// What one transition produced: messages for the portal, effects for the
/// runner, and field errors when an identity form was rejected.
#[derive(Debug, Default)]
pub struct Outcome {
    pub messages: Vec<BotMessage>,
    pub effects: Vec<Effect>,
    pub field_errors: Option<FieldErrors>,
}

impl Outcome {
    fn say(text: impl Into<String>) -> Self {
        Outcome {
            messages: vec![BotMessage::text(text)],
            ..Default::default()
        }
    }

    fn message(message: BotMessage) -> Self {
        Outcome {
            messages: vec![message],
            ..Default::default()
        }
    }

    fn effect(effect: Effect) -> Self {
        Outcome {
            effects: vec![effect],
            ..Default::default()
        }
    }
}

/// Opening prompt for a conversation sitting at the greeting step.
pub fn greet() -> Vec<BotMessage> {
    vec![greeting_prompt()]
}

pub fn handle(conv: &mut Conversation, event: Event, config: &AppConfig) -> Outcome {
    match event {
        Event::Ui(ui) => match ui {
            UiEvent::FormSubmitted { fields } => on_form(conv, &fields, config),
            UiEvent::OptionChosen { action, value } => on_option(conv, action, &value, config),
            UiEvent::FreeTextEntered { text } => on_text(conv, &text, config),
            UiEvent::FileAttached { filename, content_base64 } => {
                on_file(conv, filename, content_base64)
            }
        },
        Event::DocumentTypesLoaded { epoch, list } => {
            if epoch != conv.epoch {
                return stale(conv, "document types");
            }
            if conv.step != Step::RequestingData {
                return Outcome::default();
            }
            conv.offered.document_types = list;
            Outcome::message(form_prompt())
        }
        Event::SpecialtiesLoaded { epoch, list } => {
            if epoch != conv.epoch {
                return stale(conv, "specialties");
            }
            specialties_loaded(conv, list)
        }
        Event::DoctorsLoaded { epoch, list } => {
            if epoch != conv.epoch {
                return stale(conv, "doctors");
            }
            if conv.step != Step::SelectingDoctor {
                return Outcome::default();
            }
            conv.offered.doctors = dedupe_doctors(list);
            Outcome::message(doctor_prompt(&conv.offered.doctors))
        }
        Event::DatesLoaded { epoch, list } => {
            if epoch != conv.epoch {
                return stale(conv, "dates");
            }
            if conv.step != Step::SelectingDatetime {
                return Outcome::default();
            }
            conv.offered.dates = list;
            Outcome::message(dates_prompt(&conv.offered.dates, None))
        }
        Event::SlotsLoaded { epoch, list } => {
            if epoch != conv.epoch {
                return stale(conv, "slots");
            }
            slots_loaded(conv, list)
        }
        Event::CatalogFailed { epoch, what } => {
            if epoch != conv.epoch {
                return stale(conv, what);
            }
            // the step is left untouched so a retry lands in the same place
            Outcome::message(BotMessage::with_options(
                format!("No pudimos cargar {what}. Inténtalo nuevamente en unos segundos."),
                retry_options(),
            ))
        }
        Event::SessionReady { epoch } => {
            if epoch != conv.epoch {
                return stale(conv, "session token");
            }
            Outcome::default()
        }
        Event::SessionFailed { epoch } => {
            if epoch != conv.epoch {
                return stale(conv, "session token");
            }
            session_failed(conv)
        }
        Event::SubmitAccepted { epoch, receipt } => {
            if epoch != conv.epoch {
                return stale(conv, "submission result");
            }
            submit_accepted(conv, receipt)
        }
        Event::SubmitRejected { epoch, reason } => {
            if epoch != conv.epoch {
                return stale(conv, "submission result");
            }
            submit_rejected(conv, reason, config)
        }
        Event::IntentResolved { epoch, extracted } => {
            if epoch != conv.epoch {
                return stale(conv, "intent verdict");
            }
            on_intent(conv, extracted, config)
        }
        Event::IntentUnavailable { epoch } => {
            if epoch != conv.epoch {
                return stale(conv, "intent verdict");
            }
            fallback_offer()
        }
        Event::SessionExpired => {
            expire(conv);
            Outcome::default()
        }
    }
}

/// Token TTL ran out. Clears the in-progress request and parks the
/// conversation back at the greeting; the notice reaches the portal on its
/// next contact. Bumping the epoch makes any in-flight completion stale,
/// so a submission racing the expiry can never land afterwards.
pub fn expire(conv: &mut Conversation) {
    tracing::info!(conversation = %conv.id, step = conv.step.as_str(), "session expired");
    reset_data(conv);
    set_step(conv, Step::Greeting);
    conv.notice =
        Some("Tu sesión expiró por inactividad. Podemos empezar de nuevo cuando quieras.".to_string());
}

/// Rebuilds the prompt for wherever the conversation currently stands,
/// from cached data only. Safe to call any number of times.
pub fn reprompt(conv: &Conversation, config: &AppConfig) -> Vec<BotMessage> {
    let message = match conv.step {
        Step::Greeting => greeting_prompt(),
        Step::RequestingData => form_prompt(),
        Step::SelectingPatientType => patient_type_prompt(),
        Step::SelectingAppointmentType => appointment_kind_prompt(),
        Step::SelectingReferral => referral_prompt(&conv.offered.specialties),
        Step::SelectingSpecialty => specialty_prompt(&conv.offered.specialties),
        Step::SelectingSearchMethod => search_method_prompt(),
        Step::SelectingDoctor => doctor_prompt(&conv.offered.doctors),
        Step::SelectingShift => shift_prompt(),
        Step::SelectingDatetime => {
            if conv.appointment.shift.is_none() {
                shift_prompt()
            } else if conv.appointment.date.is_none() {
                dates_prompt(&conv.offered.dates, None)
            } else if conv.appointment.doctor_code.is_some() {
                slot_prompt(&conv.offered.slots, conv.appointment.doctor_code.as_deref())
            } else {
                hour_range_prompt(conv.appointment.shift.unwrap_or(Shift::Morning), None)
            }
        }
        Step::SelectingDoctorAfterDatetime => {
            grouped_doctor_prompt(&group_by_doctor(&conv.offered.slots))
        }
        Step::ShowingSummary => summary_message(conv),
        Step::RequestingObservations => {
            if conv.awaiting_observation {
                observation_request(is_tramite(conv))
            } else {
                observation_question()
            }
        }
        Step::FinalConfirmation => confirmation_prompt(),
        Step::AppointmentConfirmed => confirmed_reminder(conv),
        Step::Failed => BotMessage::with_options(
            failed_text(None, config),
            vec![restart_choice(), abandon_choice()],
        ),
    };
    vec![message]
}

// --- user input ------------------------------------------------------------

fn on_form(conv: &mut Conversation, fields: &PatientForm, config: &AppConfig) -> Outcome {
    if conv.step != Step::RequestingData {
        return out_of_place(conv, config);
    }
    match validate_patient_form(fields) {
        Err(errors) => Outcome {
            messages: vec![BotMessage::text("Revisa los campos marcados e inténtalo otra vez.")],
            effects: Vec::new(),
            field_errors: Some(errors),
        },
        Ok(patient) => {
            let thanks = format!(
                "Gracias, {}. Tu sesión de reserva dura 5 minutos, sigamos.",
                patient.first_name()
            );
            conv.patient = Some(patient);
            set_step(conv, Step::SelectingPatientType);
            Outcome {
                messages: vec![BotMessage::text(thanks), patient_type_prompt()],
                effects: vec![Effect::RefreshSession],
                field_errors: None,
            }
        }
    }
}

fn on_option(conv: &mut Conversation, action: Action, value: &str, config: &AppConfig) -> Outcome {
    match (conv.step, action) {
        (Step::Greeting, Action::Start) => start_flow(conv),
        (Step::SelectingPatientType, Action::PatientType) => match PatientType::parse(value) {
            Some(patient_type) => choose_patient_type(conv, patient_type),
            None => out_of_place(conv, config),
        },
        (Step::SelectingAppointmentType, Action::AppointmentType) => {
            match AppointmentKind::parse(value) {
                Some(kind) => choose_kind(conv, kind),
                None => out_of_place(conv, config),
            }
        }
        (Step::SelectingReferral, Action::Referral) => choose_referral(conv, value, config),
        (Step::SelectingSpecialty, Action::Specialty) => choose_specialty(conv, value, config),
        (Step::SelectingSearchMethod, Action::SearchMethod) => match SearchMethod::parse(value) {
            Some(method) => choose_method(conv, method),
            None => out_of_place(conv, config),
        },
        (Step::SelectingDoctor, Action::Doctor) => choose_doctor_first(conv, value, config),
        (Step::SelectingShift, Action::Shift) | (Step::SelectingDatetime, Action::Shift) => {
            match Shift::parse(value) {
                Some(shift) => choose_shift(conv, shift, config),
                None => out_of_place(conv, config),
            }
        }
        (Step::SelectingDatetime, Action::Date) => choose_date(conv, value, config),
        (Step::SelectingDatetime, Action::HourRange) => choose_hour_range(conv, value, config),
        (Step::SelectingDatetime, Action::Slot) => choose_slot(conv, value, config),
        (Step::SelectingDoctorAfterDatetime, Action::Doctor) => {
            choose_doctor_second(conv, value, config)
        }
        (Step::ShowingSummary, Action::Continue) => continue_after_summary(conv),
        (Step::RequestingObservations, Action::Yes) if conv.awaiting_confirmation => {
            request_observation(conv)
        }
        (Step::RequestingObservations, Action::No) if conv.awaiting_confirmation => {
            skip_observation(conv)
        }
        (Step::FinalConfirmation, Action::Yes) if conv.awaiting_confirmation => {
            confirm_submission(conv, config)
        }
        (Step::FinalConfirmation, Action::No) if conv.awaiting_confirmation => {
            decline_submission(conv)
        }
        (_, Action::Retry) => retry_current(conv, config),
        (_, Action::Restart) => restart_at_form(conv),
        (_, Action::Abandon) => abandon(conv),
        // stale button from an earlier prompt
        _ => out_of_place(conv, config),
    }
}

fn on_text(conv: &mut Conversation, text: &str, config: &AppConfig) -> Outcome {
    match conv.step {
        Step::RequestingData => {
            Outcome::say("Por favor usa el formulario de arriba para ingresar tus datos.")
        }
        Step::AppointmentConfirmed => Outcome::message(confirmed_reminder(conv)),
        Step::Failed => out_of_place(conv, config),
        _ if conv.awaiting_observation => capture_observation(conv, text),
        // one matcher consultation per step visit, then the fallback offer
        _ if !conv.nlp_attempted => {
            conv.nlp_attempted = true;
            Outcome::effect(Effect::ExtractIntent {
                text: text.to_string(),
                step: conv.step,
            })
        }
        _ => fallback_offer(),
    }
}

fn on_file(conv: &Conversation, filename: String, content_base64: String) -> Outcome {
    let Some(code) = conv.booking_code.clone() else {
        return Outcome::say(
            "Solo puedo recibir tu hoja de referencia después de registrar la solicitud.",
        );
    };
    if conv.step != Step::AppointmentConfirmed {
        return Outcome::say(
            "Solo puedo recibir tu hoja de referencia después de registrar la solicitud.",
        );
    }
    let decoded = match general_purpose::STANDARD.decode(content_base64.as_bytes()) {
        Ok(bytes) => bytes,
        Err(_) => return Outcome::say("No pude leer el archivo. Envíalo nuevamente, por favor."),
    };
    if decoded.len() > ATTACHMENT_MAX_BYTES {
        return Outcome::say("El archivo supera el tamaño máximo de 1 MB.");
    }
    Outcome {
        messages: vec![BotMessage::text("¡Gracias! Recibimos tu archivo de referencia.")],
        effects: vec![Effect::AttachReference {
            booking_code: code,
            filename,
            content_base64,
        }],
        field_errors: None,
    }
}

fn on_intent(conv: &mut Conversation, extracted: ExtractedIntent, config: &AppConfig) -> Outcome {
    // entities the current step explicitly trusts come first
    match conv.step {
        Step::SelectingPatientType => {
            if let Some(pt) = extracted.patient_type.as_deref().and_then(PatientType::parse) {
                return choose_patient_type(conv, pt);
            }
        }
        Step::SelectingAppointmentType => {
            if let Some(kind) = extracted
                .appointment_type
                .as_deref()
                .and_then(AppointmentKind::parse)
            {
                return choose_kind(conv, kind);
            }
        }
        Step::RequestingObservations if conv.awaiting_observation => {
            if let Some(observation) = extracted.observation.as_deref() {
                return capture_observation(conv, observation);
            }
        }
        _ => {}
    }

    match extracted.intent {
        Intent::Greeting | Intent::Affirmative if conv.step == Step::Greeting => start_flow(conv),
        Intent::Affirmative if conv.awaiting_confirmation => match conv.step {
            Step::RequestingObservations => request_observation(conv),
            Step::FinalConfirmation => confirm_submission(conv, config),
            _ => fallback_offer(),
        },
        Intent::Negative if conv.awaiting_confirmation => match conv.step {
            Step::RequestingObservations => skip_observation(conv),
            Step::FinalConfirmation => decline_submission(conv),
            _ => fallback_offer(),
        },
        Intent::Greeting => {
            let mut messages = vec![BotMessage::text("¡Hola de nuevo! Sigamos con tu solicitud.")];
            messages.extend(reprompt(conv, config));
            Outcome {
                messages,
                ..Default::default()
            }
        }
        _ => fallback_offer(),
    }
}

// --- forward transitions ----------------------------------------------------

fn start_flow(conv: &mut Conversation) -> Outcome {
    set_step(conv, Step::RequestingData);
    Outcome::effect(Effect::LoadDocumentTypes)
}

fn choose_patient_type(conv: &mut Conversation, patient_type: PatientType) -> Outcome {
    let Some(patient) = conv.patient.as_mut() else {
        return restart_at_form(conv);
    };
    patient.patient_type = Some(patient_type);
    set_step(conv, Step::SelectingAppointmentType);
    Outcome::message(appointment_kind_prompt())
}

fn choose_kind(conv: &mut Conversation, kind: AppointmentKind) -> Outcome {
    let Some(patient) = conv.patient.as_mut() else {
        return restart_at_form(conv);
    };
    patient.appointment_kind = Some(kind);
    match kind {
        AppointmentKind::Tramite => {
            // a trámite is always billed as a paying attention
            patient.patient_type = Some(PatientType::Pagante);
            let mut outcome = to_specialty(conv);
            outcome.messages.insert(
                0,
                BotMessage::text("Los trámites se registran como atención particular."),
            );
            outcome
        }
        AppointmentKind::Interconsulta => {
            set_step(conv, Step::SelectingReferral);
            Outcome::effect(Effect::LoadSpecialties)
        }
        AppointmentKind::Citado => to_specialty(conv),
    }
}

fn to_specialty(conv: &mut Conversation) -> Outcome {
    set_step(conv, Step::SelectingSpecialty);
    Outcome::effect(Effect::LoadSpecialties)
}

fn choose_referral(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let Some(specialty) = conv.offered.specialties.iter().find(|s| s.code == value) else {
        return out_of_place(conv, config);
    };
    let name = specialty.name.clone();
    if let Some(patient) = conv.patient.as_mut() {
        patient.referring_specialty = Some(name);
    }
    to_specialty(conv)
}

fn choose_specialty(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let Some(specialty) = conv.offered.specialties.iter().find(|s| s.code == value) else {
        return out_of_place(conv, config);
    };
    conv.appointment.specialty_id = Some(specialty.code.clone());
    conv.appointment.specialty_name = Some(specialty.name.clone());
    set_step(conv, Step::SelectingSearchMethod);
    Outcome::message(search_method_prompt())
}

fn choose_method(conv: &mut Conversation, method: SearchMethod) -> Outcome {
    conv.appointment.search_method = Some(method);
    match method {
        SearchMethod::ByDoctor => {
            set_step(conv, Step::SelectingDoctor);
            match conv.appointment.specialty_id.clone() {
                Some(specialty) => Outcome::effect(Effect::LoadDoctors { specialty }),
                None => restart_at_form(conv),
            }
        }
        SearchMethod::ByDatetime => {
            set_step(conv, Step::SelectingShift);
            Outcome::message(shift_prompt())
        }
    }
}

fn choose_doctor_first(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let Some(doctor) = conv.offered.doctors.iter().find(|d| d.code == value) else {
        return out_of_place(conv, config);
    };
    conv.appointment.doctor_code = Some(doctor.code.clone());
    conv.appointment.doctor_name = Some(doctor.name.clone());
    set_step(conv, Step::SelectingDatetime);
    // the shift narrows the date query even when the doctor is fixed
    Outcome::message(shift_prompt())
}

fn choose_shift(conv: &mut Conversation, shift: Shift, config: &AppConfig) -> Outcome {
    if conv.step == Step::SelectingDatetime && conv.appointment.date.is_some() {
        return out_of_place(conv, config);
    }
    conv.appointment.shift = Some(shift);
    if conv.step == Step::SelectingShift {
        set_step(conv, Step::SelectingDatetime);
    }
    match conv.appointment.specialty_id.clone() {
        Some(specialty) => Outcome::effect(Effect::LoadDates { specialty, shift }),
        None => restart_at_form(conv),
    }
}

fn choose_date(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let Ok(date) = value.parse::<chrono::NaiveDate>() else {
        return out_of_place(conv, config);
    };
    let offered = conv
        .offered
        .dates
        .iter()
        .any(|entry| entry.date == date && entry.status() != DateStatus::Exhausted);
    if !offered {
        let note = "Esa fecha ya no tiene cupos disponibles.";
        return Outcome::message(dates_prompt(&conv.offered.dates, Some(note)));
    }
    conv.appointment.date = Some(date);
    if conv.appointment.doctor_code.is_some() {
        match slot_query(conv, conv.appointment.doctor_code.clone()) {
            Some(effect) => Outcome::effect(effect),
            None => restart_at_form(conv),
        }
    } else {
        let shift = conv.appointment.shift.unwrap_or(Shift::Morning);
        Outcome::message(hour_range_prompt(shift, None))
    }
}

fn choose_hour_range(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    if conv.appointment.doctor_code.is_some() {
        return out_of_place(conv, config);
    }
    let Some(range) = HourRange::parse(value) else {
        return out_of_place(conv, config);
    };
    let shift = conv.appointment.shift.unwrap_or(Shift::Morning);
    if !shift.hour_ranges().contains(&range) {
        return out_of_place(conv, config);
    }
    conv.appointment.hour_range = Some(range);
    set_step(conv, Step::SelectingDoctorAfterDatetime);
    match slot_query(conv, None) {
        Some(effect) => Outcome::effect(effect),
        None => restart_at_form(conv),
    }
}

fn choose_doctor_second(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let groups = group_by_doctor(&conv.offered.slots);
    let Some(group) = groups.iter().find(|g| g.code == value) else {
        return out_of_place(conv, config);
    };
    conv.appointment.doctor_code = Some(group.code.clone());
    conv.appointment.doctor_name = Some(group.name.clone());
    set_step(conv, Step::SelectingDatetime);
    match slot_query(conv, conv.appointment.doctor_code.clone()) {
        Some(effect) => Outcome::effect(effect),
        None => restart_at_form(conv),
    }
}

fn choose_slot(conv: &mut Conversation, value: &str, config: &AppConfig) -> Outcome {
    let chosen = conv.offered.slots.iter().find(|slot| {
        slot.slot_id == value
            && slot.is_bookable()
            && match conv.appointment.doctor_code.as_deref() {
                Some(code) => slot.doctor_code == code,
                None => false,
            }
    });
    let Some(slot) = chosen else {
        if conv.appointment.doctor_code.is_none() {
            return out_of_place(conv, config);
        }
        let message = slot_prompt(&conv.offered.slots, conv.appointment.doctor_code.as_deref());
        return Outcome {
            messages: vec![BotMessage::text("Ese horario ya no está disponible."), message],
            ..Default::default()
        };
    };
    conv.appointment.time = Some(slot.time.clone());
    conv.appointment.room = Some(slot.room.clone());
    conv.appointment.slot_id = Some(slot.slot_id.clone());
    conv.appointment.site_code = Some(slot.site_code.clone());
    show_summary(conv, config)
}

fn show_summary(conv: &mut Conversation, config: &AppConfig) -> Outcome {
    // the summary must never show with an unset doctor or slot
    if conv.patient.is_none() || !conv.appointment.ready_for_submission() {
        tracing::warn!(
            conversation = %conv.id,
            step = conv.step.as_str(),
            "summary requested with incomplete selection"
        );
        return out_of_place(conv, config);
    }
    set_step(conv, Step::ShowingSummary);
    Outcome::message(summary_message(conv))
}

fn continue_after_summary(conv: &mut Conversation) -> Outcome {
    set_step(conv, Step::RequestingObservations);
    if is_tramite(conv) {
        conv.awaiting_observation = true;
        Outcome::message(observation_request(true))
    } else {
        conv.awaiting_confirmation = true;
        Outcome::message(observation_question())
    }
}

fn request_observation(conv: &mut Conversation) -> Outcome {
    conv.awaiting_confirmation = false;
    conv.awaiting_observation = true;
    Outcome::message(observation_request(false))
}

fn skip_observation(conv: &mut Conversation) -> Outcome {
    conv.awaiting_confirmation = false;
    conv.observation.clear();
    to_confirmation(conv)
}

fn capture_observation(conv: &mut Conversation, text: &str) -> Outcome {
    let cleaned = sanitize_text(text.trim());
    if cleaned.is_empty() {
        let prompt = if is_tramite(conv) {
            "El motivo es obligatorio para un trámite. Cuéntanos brevemente qué necesitas."
        } else {
            "No recibí tu observación. Escríbela en un solo mensaje, por favor."
        };
        return Outcome::say(prompt);
    }
    if cleaned.chars().count() > OBSERVATION_MAX_CHARS {
        return Outcome::say(format!(
            "La observación no puede superar los {OBSERVATION_MAX_CHARS} caracteres. Resúmela un poco, por favor."
        ));
    }
    conv.observation = cleaned;
    conv.awaiting_observation = false;
    to_confirmation(conv)
}

fn to_confirmation(conv: &mut Conversation) -> Outcome {
    set_step(conv, Step::FinalConfirmation);
    conv.awaiting_confirmation = true;
    Outcome::message(confirmation_prompt())
}

fn confirm_submission(conv: &mut Conversation, config: &AppConfig) -> Outcome {
    conv.awaiting_confirmation = false;
    let request = conv
        .patient
        .as_ref()
        .and_then(|patient| BookingRequest::build(patient, &conv.appointment, &conv.observation));
    match request {
        Some(request) => Outcome {
            messages: vec![BotMessage::text("Estamos registrando tu solicitud...")],
            effects: vec![Effect::Submit { request: Box::new(request) }],
            field_errors: None,
        },
        None => {
            tracing::error!(conversation = %conv.id, "confirmation reached without a complete request");
            fail_conversation(conv, None, config)
        }
    }
}

fn decline_submission(conv: &mut Conversation) -> Outcome {
    reset_data(conv);
    set_step(conv, Step::Greeting);
    Outcome {
        messages: vec![
            BotMessage::text("Entendido, no enviaremos la solicitud."),
            greeting_prompt(),
        ],
        effects: vec![Effect::CancelSession],
        field_errors: None,
    }
}

fn retry_current(conv: &mut Conversation, config: &AppConfig) -> Outcome {
    match conv.step {
        Step::RequestingData => Outcome::effect(Effect::LoadDocumentTypes),
        Step::SelectingReferral | Step::SelectingSpecialty => {
            Outcome::effect(Effect::LoadSpecialties)
        }
        Step::SelectingDoctor => match conv.appointment.specialty_id.clone() {
            Some(specialty) => Outcome::effect(Effect::LoadDoctors { specialty }),
            None => restart_at_form(conv),
        },
        Step::SelectingDatetime => {
            if conv.appointment.shift.is_none() {
                Outcome::message(shift_prompt())
            } else if conv.appointment.date.is_none() {
                let shift = conv.appointment.shift.unwrap_or(Shift::Morning);
                match conv.appointment.specialty_id.clone() {
                    Some(specialty) => Outcome::effect(Effect::LoadDates { specialty, shift }),
                    None => restart_at_form(conv),
                }
            } else if conv.appointment.doctor_code.is_some() {
                match slot_query(conv, conv.appointment.doctor_code.clone()) {
                    Some(effect) => Outcome::effect(effect),
                    None => restart_at_form(conv),
                }
            } else {
                let shift = conv.appointment.shift.unwrap_or(Shift::Morning);
                Outcome::message(hour_range_prompt(shift, None))
            }
        }
        Step::SelectingDoctorAfterDatetime => match slot_query(conv, None) {
            Some(effect) => Outcome::effect(effect),
            None => restart_at_form(conv),
        },
        _ => out_of_place(conv, config),
    }
}

/// Fallback path: forget everything and ask for the identity form again.
fn restart_at_form(conv: &mut Conversation) -> Outcome {
    reset_data(conv);
    set_step(conv, Step::RequestingData);
    Outcome {
        messages: vec![BotMessage::text("Empecemos de nuevo con tus datos personales.")],
        effects: vec![Effect::CancelSession, Effect::LoadDocumentTypes],
        field_errors: None,
    }
}

fn abandon(conv: &mut Conversation) -> Outcome {
    reset_data(conv);
    set_step(conv, Step::Greeting);
    Outcome {
        messages: vec![
            BotMessage::text("Gracias por escribirnos. Aquí estaré cuando quieras retomar tu cita."),
            greeting_prompt(),
        ],
        effects: vec![Effect::CancelSession],
        field_errors: None,
    }
}

fn fallback_offer() -> Outcome {
    Outcome::message(BotMessage::with_options(
        "Disculpa, no logré entenderte. ¿Qué deseas hacer?",
        vec![restart_choice(), abandon_choice()],
    ))
}

// --- completions ------------------------------------------------------------

fn specialties_loaded(conv: &mut Conversation, list: Vec<Specialty>) -> Outcome {
    match conv.step {
        Step::SelectingReferral => {
            conv.offered.specialties = list;
            Outcome::message(referral_prompt(&conv.offered.specialties))
        }
        Step::SelectingSpecialty => {
            conv.offered.specialties = list;
            Outcome::message(specialty_prompt(&conv.offered.specialties))
        }
        _ => Outcome::default(),
    }
}

fn slots_loaded(conv: &mut Conversation, list: Vec<SlotRecord>) -> Outcome {
    match conv.step {
        Step::SelectingDatetime => {
            conv.offered.slots = list;
            let doctor = conv.appointment.doctor_code.as_deref();
            let any_bookable = conv
                .offered
                .slots
                .iter()
                .any(|slot| slot.is_bookable() && doctor.is_none_or(|code| slot.doctor_code == code));
            if !any_bookable {
                conv.appointment.date = None;
                let note = "Ese día ya no tiene horarios libres. Elige otra fecha.";
                return Outcome::message(dates_prompt(&conv.offered.dates, Some(note)));
            }
            Outcome::message(slot_prompt(&conv.offered.slots, doctor))
        }
        Step::SelectingDoctorAfterDatetime => {
            conv.offered.slots = list;
            let groups = group_by_doctor(&conv.offered.slots);
            if groups.is_empty() {
                conv.appointment.hour_range = None;
                set_step(conv, Step::SelectingDatetime);
                let shift = conv.appointment.shift.unwrap_or(Shift::Morning);
                let note = "Ningún médico atiende en esa franja. Elige otro horario.";
                return Outcome::message(hour_range_prompt(shift, Some(note)));
            }
            Outcome::message(grouped_doctor_prompt(&groups))
        }
        _ => Outcome::default(),
    }
}

fn session_failed(conv: &mut Conversation) -> Outcome {
    let mut outcome = restart_at_form(conv);
    outcome.messages.insert(
        0,
        BotMessage::text(
            "Tu sesión de reserva no está activa. Necesito tus datos nuevamente para continuar.",
        ),
    );
    outcome
}

fn submit_accepted(conv: &mut Conversation, receipt: BookingReceipt) -> Outcome {
    set_step(conv, Step::AppointmentConfirmed);
    conv.booking_code = Some(receipt.code.clone());
    let mut text = format!(
        "¡Listo! Tu solicitud de cita quedó registrada con el código {}. Te llamaremos para confirmarla.",
        receipt.code
    );
    if let Some(address) = conv.appointment.site_code.as_deref().and_then(site_address) {
        text.push_str(&format!(" Te atenderemos en: {address}."));
    }
    if is_interconsulta(conv) {
        text.push_str(" Si tienes tu hoja de referencia a la mano, puedes adjuntarla aquí.");
    }
    Outcome {
        messages: vec![BotMessage::text(text)],
        effects: vec![Effect::CancelSession],
        field_errors: None,
    }
}

fn submit_rejected(
    conv: &mut Conversation,
    reason: Option<String>,
    config: &AppConfig,
) -> Outcome {
    fail_conversation(conv, reason, config)
}

fn fail_conversation(
    conv: &mut Conversation,
    reason: Option<String>,
    config: &AppConfig,
) -> Outcome {
    set_step(conv, Step::Failed);
    Outcome {
        messages: vec![BotMessage::with_options(
            failed_text(reason.as_deref(), config),
            vec![restart_choice(), abandon_choice()],
        )],
        effects: vec![Effect::CancelSession],
        field_errors: None,
    }
}

// --- state helpers ----------------------------------------------------------

fn set_step(conv: &mut Conversation, step: Step) {
    conv.step = step;
    conv.nlp_attempted = false;
    conv.awaiting_observation = false;
    conv.awaiting_confirmation = false;
}

/// Clears captured data and advances the epoch so in-flight completions
/// for the old attempt get dropped on arrival.
fn reset_data(conv: &mut Conversation) {
    conv.epoch += 1;
    conv.patient = None;
    conv.appointment = Default::default();
    conv.observation.clear();
    conv.booking_code = None;
    conv.offered = Default::default();
    conv.notice = None;
}

fn stale(conv: &Conversation, what: &str) -> Outcome {
    tracing::debug!(conversation = %conv.id, what, "dropping stale completion");
    Outcome::default()
}

fn out_of_place(conv: &Conversation, config: &AppConfig) -> Outcome {
    Outcome {
        messages: reprompt(conv, config),
        ..Default::default()
    }
}

fn slot_query(conv: &Conversation, doctor: Option<String>) -> Option<Effect> {
    Some(Effect::LoadSlots {
        specialty: conv.appointment.specialty_id.clone()?,
        date: conv.appointment.date?,
        shift: conv.appointment.shift?,
        doctor,
        hour_range: conv.appointment.hour_range,
    })
}

fn is_tramite(conv: &Conversation) -> bool {
    conv.patient
        .as_ref()
        .and_then(|p| p.appointment_kind)
        .map(|kind| kind == AppointmentKind::Tramite)
        .unwrap_or(false)
}

fn is_interconsulta(conv: &Conversation) -> bool {
    conv.patient
        .as_ref()
        .and_then(|p| p.appointment_kind)
        .map(|kind| kind == AppointmentKind::Interconsulta)
        .unwrap_or(false)
}

// --- prompts ----------------------------------------------------------------

fn greeting_prompt() -> BotMessage {
    BotMessage::with_options(
        "¡Hola! Soy el asistente de citas del hospital. Puedo ayudarte a solicitar una cita médica.",
        vec![Choice::new(Action::Start, "start", "Solicitar una cita")],
    )
}

fn form_prompt() -> BotMessage {
    BotMessage::text("Completa el formulario con tus datos personales para empezar.")
}

fn patient_type_prompt() -> BotMessage {
    let options = [PatientType::Pagante, PatientType::Sis, PatientType::Soat]
        .iter()
        .map(|pt| Choice::new(Action::PatientType, pt.as_str(), pt.label()))
        .collect();
    BotMessage::with_options("¿Qué tipo de atención tienes?", options)
}

fn appointment_kind_prompt() -> BotMessage {
    let options = [
        AppointmentKind::Citado,
        AppointmentKind::Interconsulta,
        AppointmentKind::Tramite,
    ]
    .iter()
    .map(|kind| Choice::new(Action::AppointmentType, kind.as_str(), kind.label()))
    .collect();
    BotMessage::with_options("¿Qué tipo de cita necesitas?", options)
}

fn specialty_options(specialties: &[Specialty], action: Action) -> Vec<Choice> {
    specialties
        .iter()
        .map(|s| Choice::new(action, s.code.clone(), s.name.clone()))
        .collect()
}

fn referral_prompt(specialties: &[Specialty]) -> BotMessage {
    if specialties.is_empty() {
        return BotMessage::with_options(
            "No encontré especialidades en el sistema por ahora.",
            retry_options(),
        );
    }
    BotMessage::with_options(
        "¿Qué especialidad te está refiriendo?",
        specialty_options(specialties, Action::Referral),
    )
}

fn specialty_prompt(specialties: &[Specialty]) -> BotMessage {
    if specialties.is_empty() {
        return BotMessage::with_options(
            "No encontré especialidades con atención en este periodo.",
            retry_options(),
        );
    }
    BotMessage::with_options(
        "¿En qué especialidad deseas atenderte?",
        specialty_options(specialties, Action::Specialty),
    )
}

fn search_method_prompt() -> BotMessage {
    BotMessage::with_options(
        "¿Cómo prefieres buscar tu cita?",
        vec![
            Choice::new(Action::SearchMethod, "by-doctor", "Elegir primero al médico"),
            Choice::new(Action::SearchMethod, "by-datetime", "Elegir fecha y horario"),
        ],
    )
}

fn doctor_prompt(doctors: &[Doctor]) -> BotMessage {
    if doctors.is_empty() {
        return BotMessage::with_options(
            "No encontré médicos disponibles para esa especialidad en este periodo.",
            retry_options(),
        );
    }
    let options = doctors
        .iter()
        .map(|d| Choice::new(Action::Doctor, d.code.clone(), d.name.clone()))
        .collect();
    BotMessage::with_options("¿Con qué médico deseas atenderte?", options)
}

fn shift_prompt() -> BotMessage {
    BotMessage::with_options(
        "¿En qué turno prefieres atenderte?",
        vec![
            Choice::new(Action::Shift, "M", Shift::Morning.label()),
            Choice::new(Action::Shift, "T", Shift::Afternoon.label()),
        ],
    )
}

fn dates_prompt(dates: &[DateEntry], note: Option<&str>) -> BotMessage {
    let open: Vec<&DateEntry> = dates
        .iter()
        .filter(|entry| entry.status() != DateStatus::Exhausted)
        .collect();
    if open.is_empty() {
        let text = match note {
            Some(note) => format!("{note} Por ahora no hay fechas con cupos."),
            None => "Por ahora no hay fechas con cupos para esa búsqueda.".to_string(),
        };
        return BotMessage::with_options(text, retry_options());
    }
    let mut text = match note {
        Some(note) => format!("{note}\nEstas son las fechas con cupos:"),
        None => "Estas son las fechas con cupos:".to_string(),
    };
    let exhausted: Vec<String> = dates
        .iter()
        .filter(|entry| entry.status() == DateStatus::Exhausted)
        .map(|entry| entry.date.format("%d/%m").to_string())
        .collect();
    if !exhausted.is_empty() {
        text.push_str(&format!("\nSin cupos: {}.", exhausted.join(", ")));
    }
    let options = open
        .iter()
        .map(|entry| {
            let label = match entry.status() {
                DateStatus::Open { remaining: Some(n) } => {
                    format!("{} ({n} cupos)", entry.date.format("%d/%m/%Y"))
                }
                _ => entry.date.format("%d/%m/%Y").to_string(),
            };
            Choice::new(Action::Date, entry.date.to_string(), label)
        })
        .collect();
    BotMessage::with_options(text, options)
}

fn hour_range_prompt(shift: Shift, note: Option<&str>) -> BotMessage {
    let text = match note {
        Some(note) => format!("{note}\n¿En qué horario prefieres atenderte?"),
        None => "¿En qué horario prefieres atenderte?".to_string(),
    };
    let options = shift
        .hour_ranges()
        .iter()
        .map(|range| Choice::new(Action::HourRange, range.as_value(), range.label()))
        .collect();
    BotMessage::with_options(text, options)
}

fn slot_prompt(slots: &[SlotRecord], doctor: Option<&str>) -> BotMessage {
    let options: Vec<Choice> = slots
        .iter()
        .filter(|slot| {
            slot.is_bookable() && doctor.is_none_or(|code| slot.doctor_code == code)
        })
        .map(|slot| {
            Choice::new(
                Action::Slot,
                slot.slot_id.clone(),
                format!("{} (consultorio {})", slot.time, slot.room),
            )
        })
        .collect();
    if options.is_empty() {
        return BotMessage::with_options(
            "No quedan horarios libres con esa selección.",
            retry_options(),
        );
    }
    BotMessage::with_options("Elige el horario de tu cita:", options)
}

fn grouped_doctor_prompt(groups: &[DoctorSlots]) -> BotMessage {
    if groups.is_empty() {
        return BotMessage::with_options(
            "Ningún médico atiende en esa franja.",
            retry_options(),
        );
    }
    let options = groups
        .iter()
        .map(|group| {
            Choice::new(
                Action::Doctor,
                group.code.clone(),
                format!("{} ({} horarios)", group.name, group.slots.len()),
            )
        })
        .collect();
    BotMessage::with_options("Estos médicos atienden en ese horario:", options)
}

fn summary_message(conv: &Conversation) -> BotMessage {
    let patient = conv.patient.as_ref();
    let appt = &conv.appointment;
    let mut text = String::from("Resumen de tu solicitud:\n");
    if let Some(p) = patient {
        text.push_str(&format!(
            "Paciente: {} ({} {})\n",
            p.full_name, p.document_type, p.document_number
        ));
        if let Some(pt) = p.effective_patient_type() {
            text.push_str(&format!("Tipo de atención: {}\n", pt.label()));
        }
        if let Some(kind) = p.appointment_kind {
            text.push_str(&format!("Tipo de cita: {}\n", kind.label()));
        }
        if let Some(referral) = &p.referring_specialty {
            text.push_str(&format!("Referido por: {referral}\n"));
        }
    }
    text.push_str(&format!(
        "Especialidad: {}\n",
        appt.specialty_name.as_deref().unwrap_or("-")
    ));
    text.push_str(&format!(
        "Médico: {}\n",
        appt.doctor_name.as_deref().unwrap_or("-")
    ));
    if let Some(date) = appt.date {
        text.push_str(&format!("Fecha: {}\n", date.format("%d/%m/%Y")));
    }
    text.push_str(&format!("Hora: {}\n", appt.time.as_deref().unwrap_or("-")));
    if let Some(shift) = appt.shift {
        text.push_str(&format!("Turno: {}\n", shift.label()));
    }
    if let Some(room) = &appt.room {
        text.push_str(&format!("Consultorio: {room}\n"));
    }
    if let Some(address) = appt.site_code.as_deref().and_then(site_address) {
        text.push_str(&format!("Sede: {address}\n"));
    }
    text.push_str("¿Continuamos?");
    BotMessage::with_options(text, vec![Choice::new(Action::Continue, "continue", "Continuar")])
}

fn observation_question() -> BotMessage {
    BotMessage::with_options(
        "¿Deseas agregar una observación a tu solicitud?",
        vec![yes_choice(), no_choice()],
    )
}

fn observation_request(mandatory: bool) -> BotMessage {
    let text = if mandatory {
        format!(
            "Cuéntanos el motivo de tu trámite (obligatorio, máximo {OBSERVATION_MAX_CHARS} caracteres)."
        )
    } else {
        format!("Escribe tu observación (máximo {OBSERVATION_MAX_CHARS} caracteres).")
    };
    BotMessage::text(text)
}

fn confirmation_prompt() -> BotMessage {
    BotMessage::with_options(
        "¿Confirmas el envío de tu solicitud de cita?",
        vec![yes_choice(), no_choice()],
    )
}

fn confirmed_reminder(conv: &Conversation) -> BotMessage {
    let code = conv.booking_code.as_deref().unwrap_or("-");
    BotMessage::text(format!(
        "Tu solicitud ya fue registrada con el código {code}. Te llamaremos para confirmar la cita."
    ))
}

fn failed_text(reason: Option<&str>, config: &AppConfig) -> String {
    match reason {
        Some(reason) => format!(
            "No pudimos registrar tu solicitud: {reason}. También puedes llamar a nuestra central {}.",
            config.support_phone
        ),
        None => format!(
            "No pudimos registrar tu solicitud en este momento. También puedes llamar a nuestra central {}.",
            config.support_phone
        ),
    }
}

fn retry_options() -> Vec<Choice> {
    vec![
        Choice::new(Action::Retry, "retry", "Reintentar"),
        restart_choice(),
    ]
}

fn restart_choice() -> Choice {
    Choice::new(Action::Restart, "restart", "Volver a empezar")
}

fn abandon_choice() -> Choice {
    Choice::new(Action::Abandon, "abandon", "Finalizar")
}

fn yes_choice() -> Choice {
    Choice::new(Action::Yes, "yes", "Sí")
}

fn no_choice() -> Choice {
    Choice::new(Action::No, "no", "No")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BookingWindow;
    use crate::models::DocumentType;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn config() -> AppConfig {
        AppConfig {
            port: 0,
            catalog_url: "http://localhost:8081".to_string(),
            booking_url: "http://localhost:8082".to_string(),
            intent_url: "http://localhost:8083".to_string(),
            support_phone: "(01) 612-4000".to_string(),
            window: BookingWindow {
                start: date("2025-10-01"),
                end: date("2025-10-31"),
            },
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn new_conv() -> Conversation {
        Conversation::new(Uuid::new_v4())
    }

    fn option(conv: &mut Conversation, action: Action, value: &str) -> Outcome {
        handle(
            conv,
            Event::Ui(UiEvent::OptionChosen {
                action,
                value: value.to_string(),
            }),
            &config(),
        )
    }

    fn text(conv: &mut Conversation, input: &str) -> Outcome {
        handle(
            conv,
            Event::Ui(UiEvent::FreeTextEntered {
                text: input.to_string(),
            }),
            &config(),
        )
    }

    fn form() -> PatientForm {
        PatientForm {
            full_name: "Juan Carlos Paredes".to_string(),
            phone: "987654321".to_string(),
            document_type: "DNI".to_string(),
            document_number: "45678912".to_string(),
            verification_digit: None,
            email: "juan@example.com".to_string(),
        }
    }

    fn document_types() -> Vec<DocumentType> {
        vec![DocumentType {
            code: "DNI".to_string(),
            name: "Documento Nacional de Identidad".to_string(),
        }]
    }

    fn specialties() -> Vec<Specialty> {
        vec![
            Specialty { code: "0019".to_string(), name: "Cardiología".to_string() },
            Specialty { code: "0023".to_string(), name: "Dermatología".to_string() },
        ]
    }

    fn date_entries() -> Vec<DateEntry> {
        vec![
            DateEntry { date: date("2025-10-15"), remaining: Some(3) },
            DateEntry { date: date("2025-10-16"), remaining: Some(0) },
            DateEntry { date: date("2025-10-17"), remaining: None },
        ]
    }

    fn slot(id: &str, doctor: &str, name: &str, time: &str, state: &str) -> SlotRecord {
        SlotRecord {
            slot_id: id.to_string(),
            doctor_code: doctor.to_string(),
            doctor_name: name.to_string(),
            time: time.to_string(),
            room: "C-204".to_string(),
            state: state.to_string(),
            already_requested: false,
            site_code: "1".to_string(),
        }
    }

    fn advance_to_patient_type(conv: &mut Conversation) {
        let cfg = config();
        let out = handle(
            conv,
            Event::Ui(UiEvent::OptionChosen { action: Action::Start, value: "start".to_string() }),
            &cfg,
        );
        assert_eq!(out.effects, vec![Effect::LoadDocumentTypes]);
        assert_eq!(conv.step, Step::RequestingData);
        handle(
            conv,
            Event::DocumentTypesLoaded { epoch: conv.epoch, list: document_types() },
            &cfg,
        );
        let out = handle(
            conv,
            Event::Ui(UiEvent::FormSubmitted { fields: form() }),
            &cfg,
        );
        assert_eq!(out.effects, vec![Effect::RefreshSession]);
        assert_eq!(conv.step, Step::SelectingPatientType);
    }

    fn advance_to_search_method(conv: &mut Conversation) {
        advance_to_patient_type(conv);
        option(conv, Action::PatientType, "SIS");
        let out = option(conv, Action::AppointmentType, "CITADO");
        assert_eq!(out.effects, vec![Effect::LoadSpecialties]);
        handle(
            conv,
            Event::SpecialtiesLoaded { epoch: conv.epoch, list: specialties() },
            &config(),
        );
        option(conv, Action::Specialty, "0019");
        assert_eq!(conv.step, Step::SelectingSearchMethod);
    }

    fn advance_doctor_first_to_summary(conv: &mut Conversation) {
        advance_to_search_method(conv);
        let cfg = config();
        let out = option(conv, Action::SearchMethod, "by-doctor");
        assert_eq!(out.effects, vec![Effect::LoadDoctors { specialty: "0019".to_string() }]);
        handle(
            conv,
            Event::DoctorsLoaded {
                epoch: conv.epoch,
                list: vec![
                    Doctor { code: "XYZ".to_string(), name: "Dr. Zapata".to_string() },
                    Doctor { code: "ABC".to_string(), name: "Dra. Vega".to_string() },
                ],
            },
            &cfg,
        );
        let out = option(conv, Action::Doctor, "ABC");
        assert_eq!(conv.step, Step::SelectingDatetime);
        assert!(out.effects.is_empty());
        let out = option(conv, Action::Shift, "M");
        assert_eq!(
            out.effects,
            vec![Effect::LoadDates { specialty: "0019".to_string(), shift: Shift::Morning }]
        );
        handle(conv, Event::DatesLoaded { epoch: conv.epoch, list: date_entries() }, &cfg);
        let out = option(conv, Action::Date, "2025-10-15");
        assert_eq!(
            out.effects,
            vec![Effect::LoadSlots {
                specialty: "0019".to_string(),
                date: date("2025-10-15"),
                shift: Shift::Morning,
                doctor: Some("ABC".to_string()),
                hour_range: None,
            }]
        );
        handle(
            conv,
            Event::SlotsLoaded {
                epoch: conv.epoch,
                list: vec![
                    slot("CUP-881", "ABC", "Dra. Vega", "09:00", "D"),
                    slot("CUP-882", "ABC", "Dra. Vega", "09:20", "X"),
                    slot("CUP-883", "ABC", "Dra. Vega", "10:00", "L"),
                ],
            },
            &cfg,
        );
        option(conv, Action::Slot, "CUP-881");
        assert_eq!(conv.step, Step::ShowingSummary);
    }

    fn advance_to_final_confirmation(conv: &mut Conversation) {
        advance_doctor_first_to_summary(conv);
        option(conv, Action::Continue, "continue");
        option(conv, Action::No, "no");
        assert_eq!(conv.step, Step::FinalConfirmation);
    }

    #[test]
    fn test_start_loads_documents_then_shows_form() {
        let mut conv = new_conv();
        let out = option(&mut conv, Action::Start, "start");
        assert_eq!(conv.step, Step::RequestingData);
        assert_eq!(out.effects, vec![Effect::LoadDocumentTypes]);
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::DocumentTypesLoaded { epoch, list: document_types() },
            &config(),
        );
        assert_eq!(conv.offered.document_types.len(), 1);
        assert!(out.messages[0].text.contains("formulario"));
    }

    #[test]
    fn test_rejected_form_keeps_step_and_reports_fields() {
        let mut conv = new_conv();
        option(&mut conv, Action::Start, "start");
        let mut bad = form();
        bad.phone = "12".to_string();
        bad.email = "nope".to_string();
        let out = handle(
            &mut conv,
            Event::Ui(UiEvent::FormSubmitted { fields: bad }),
            &config(),
        );
        assert_eq!(conv.step, Step::RequestingData);
        assert!(conv.patient.is_none());
        assert!(out.effects.is_empty());
        let errors = out.field_errors.unwrap();
        assert!(errors.contains_key("phone"));
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn test_valid_form_refreshes_session_and_asks_patient_type() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        assert_eq!(conv.patient.as_ref().unwrap().full_name, "Juan Carlos Paredes");
        let out = option(&mut conv, Action::PatientType, "SIS");
        assert_eq!(conv.step, Step::SelectingAppointmentType);
        assert_eq!(out.messages[0].options.len(), 3);
    }

    #[test]
    fn test_tramite_is_forced_to_pagante() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        option(&mut conv, Action::PatientType, "SIS");
        let out = option(&mut conv, Action::AppointmentType, "TRAMITE");
        let patient = conv.patient.as_ref().unwrap();
        assert_eq!(patient.patient_type, Some(PatientType::Pagante));
        assert_eq!(patient.appointment_kind, Some(AppointmentKind::Tramite));
        assert_eq!(conv.step, Step::SelectingSpecialty);
        assert!(out.messages[0].text.contains("particular"));
        assert_eq!(out.effects, vec![Effect::LoadSpecialties]);
    }

    #[test]
    fn test_interconsulta_detours_through_referral() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        option(&mut conv, Action::PatientType, "SOAT");
        let out = option(&mut conv, Action::AppointmentType, "INTERCONSULTA");
        assert_eq!(conv.step, Step::SelectingReferral);
        assert_eq!(out.effects, vec![Effect::LoadSpecialties]);
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::SpecialtiesLoaded { epoch, list: specialties() },
            &config(),
        );
        assert_eq!(out.messages[0].options[0].action, Action::Referral);
        let out = option(&mut conv, Action::Referral, "0023");
        assert_eq!(
            conv.patient.as_ref().unwrap().referring_specialty.as_deref(),
            Some("Dermatología")
        );
        assert_eq!(conv.step, Step::SelectingSpecialty);
        assert_eq!(out.effects, vec![Effect::LoadSpecialties]);
    }

    #[test]
    fn test_doctor_roster_is_deduped_and_sorted() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        option(&mut conv, Action::SearchMethod, "by-doctor");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::DoctorsLoaded {
                epoch,
                list: vec![
                    Doctor { code: "XYZ".to_string(), name: "Dr. Zapata".to_string() },
                    Doctor { code: "ABC".to_string(), name: "Dra. Vega".to_string() },
                    Doctor { code: "XYZ".to_string(), name: "Dr. Zapata".to_string() },
                ],
            },
            &config(),
        );
        let labels: Vec<&str> = out.messages[0]
            .options
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Dr. Zapata", "Dra. Vega"]);
    }

    #[test]
    fn test_doctor_first_path_reaches_summary() {
        let mut conv = new_conv();
        advance_doctor_first_to_summary(&mut conv);
        assert_eq!(conv.appointment.doctor_code.as_deref(), Some("ABC"));
        assert_eq!(conv.appointment.slot_id.as_deref(), Some("CUP-881"));
        assert_eq!(conv.appointment.time.as_deref(), Some("09:00"));
        let summary = &reprompt(&conv, &config())[0].text;
        assert!(summary.contains("Dra. Vega"));
        assert!(summary.contains("15/10/2025"));
        assert!(summary.contains("09:00"));
    }

    #[test]
    fn test_non_bookable_slot_is_never_offered() {
        let mut conv = new_conv();
        advance_doctor_first_to_summary(&mut conv);
        // CUP-882 had state X and must not have been offered
        let message = slot_prompt(&conv.offered.slots, Some("ABC"));
        let offered: Vec<&str> = message
            .options
            .iter()
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(offered, vec!["CUP-881", "CUP-883"]);
    }

    #[test]
    fn test_exhausted_date_cannot_be_chosen() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        option(&mut conv, Action::SearchMethod, "by-datetime");
        option(&mut conv, Action::Shift, "M");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DatesLoaded { epoch, list: date_entries() },
            &config(),
        );
        let out = option(&mut conv, Action::Date, "2025-10-16");
        assert!(conv.appointment.date.is_none());
        assert!(out.messages[0].text.contains("cupos"));
        assert!(out.effects.is_empty());
    }

    #[test]
    fn test_dates_prompt_separates_open_and_exhausted() {
        let message = dates_prompt(&date_entries(), None);
        // only the two open dates become options
        assert_eq!(message.options.len(), 2);
        assert_eq!(message.options[0].value, "2025-10-15");
        assert!(message.options[0].label.contains("3 cupos"));
        assert!(message.text.contains("Sin cupos: 16/10."));
    }

    #[test]
    fn test_datetime_first_asks_hour_range_before_doctor() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        let out = option(&mut conv, Action::SearchMethod, "by-datetime");
        assert_eq!(conv.step, Step::SelectingShift);
        assert!(out.effects.is_empty());
        option(&mut conv, Action::Shift, "T");
        assert_eq!(conv.step, Step::SelectingDatetime);
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DatesLoaded { epoch, list: date_entries() },
            &config(),
        );
        let out = option(&mut conv, Action::Date, "2025-10-17");
        // no slot query yet: the hour bucket comes first on this path
        assert!(out.effects.is_empty());
        assert!(out.messages[0].options.iter().all(|c| c.action == Action::HourRange));
    }

    #[test]
    fn test_datetime_first_groups_doctors_then_narrows() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        option(&mut conv, Action::SearchMethod, "by-datetime");
        option(&mut conv, Action::Shift, "M");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DatesLoaded { epoch, list: date_entries() },
            &config(),
        );
        option(&mut conv, Action::Date, "2025-10-15");
        let out = option(&mut conv, Action::HourRange, "09:00-10:00");
        assert_eq!(conv.step, Step::SelectingDoctorAfterDatetime);
        assert_eq!(
            out.effects,
            vec![Effect::LoadSlots {
                specialty: "0019".to_string(),
                date: date("2025-10-15"),
                shift: Shift::Morning,
                doctor: None,
                hour_range: HourRange::parse("09:00-10:00"),
            }]
        );
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::SlotsLoaded {
                epoch,
                list: vec![
                    slot("C-1", "XYZ", "Dr. Zapata", "09:40", "D"),
                    slot("C-2", "ABC", "Dra. Vega", "09:00", "D"),
                    slot("C-3", "XYZ", "Dr. Zapata", "09:20", "L"),
                ],
            },
            &config(),
        );
        let labels: Vec<&str> = out.messages[0]
            .options
            .iter()
            .map(|c| c.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Dr. Zapata (2 horarios)", "Dra. Vega (1 horarios)"]);
        let out = option(&mut conv, Action::Doctor, "XYZ");
        assert_eq!(conv.step, Step::SelectingDatetime);
        assert_eq!(conv.appointment.doctor_name.as_deref(), Some("Dr. Zapata"));
        match &out.effects[0] {
            Effect::LoadSlots { doctor, hour_range, .. } => {
                assert_eq!(doctor.as_deref(), Some("XYZ"));
                assert!(hour_range.is_some());
            }
            other => panic!("unexpected effect: {other:?}"),
        }
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::SlotsLoaded {
                epoch,
                list: vec![
                    slot("C-1", "XYZ", "Dr. Zapata", "09:40", "D"),
                    slot("C-3", "XYZ", "Dr. Zapata", "09:20", "L"),
                ],
            },
            &config(),
        );
        option(&mut conv, Action::Slot, "C-3");
        assert_eq!(conv.step, Step::ShowingSummary);
        assert_eq!(conv.appointment.time.as_deref(), Some("09:20"));
    }

    #[test]
    fn test_summary_flow_to_confirmation_without_observation() {
        let mut conv = new_conv();
        advance_doctor_first_to_summary(&mut conv);
        let out = option(&mut conv, Action::Continue, "continue");
        assert_eq!(conv.step, Step::RequestingObservations);
        assert!(conv.awaiting_confirmation);
        assert_eq!(out.messages[0].options.len(), 2);
        option(&mut conv, Action::No, "no");
        assert_eq!(conv.step, Step::FinalConfirmation);
        assert!(conv.observation.is_empty());
    }

    #[test]
    fn test_observation_is_sanitized_and_captured() {
        let mut conv = new_conv();
        advance_doctor_first_to_summary(&mut conv);
        option(&mut conv, Action::Continue, "continue");
        option(&mut conv, Action::Yes, "yes");
        assert!(conv.awaiting_observation);
        text(&mut conv, r#"dolor <fuerte> en "reposo""#);
        assert_eq!(conv.observation, "dolor fuerte en reposo");
        assert_eq!(conv.step, Step::FinalConfirmation);
    }

    #[test]
    fn test_observation_over_limit_is_rejected() {
        let mut conv = new_conv();
        advance_doctor_first_to_summary(&mut conv);
        option(&mut conv, Action::Continue, "continue");
        option(&mut conv, Action::Yes, "yes");
        let out = text(&mut conv, &"a".repeat(OBSERVATION_MAX_CHARS + 1));
        assert!(conv.awaiting_observation);
        assert!(conv.observation.is_empty());
        assert!(out.messages[0].text.contains("100"));
    }

    #[test]
    fn test_tramite_observation_is_mandatory() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        option(&mut conv, Action::PatientType, "SIS");
        option(&mut conv, Action::AppointmentType, "TRAMITE");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::SpecialtiesLoaded { epoch, list: specialties() },
            &config(),
        );
        option(&mut conv, Action::Specialty, "0019");
        option(&mut conv, Action::SearchMethod, "by-doctor");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DoctorsLoaded {
                epoch,
                list: vec![Doctor { code: "ABC".to_string(), name: "Dra. Vega".to_string() }],
            },
            &config(),
        );
        option(&mut conv, Action::Doctor, "ABC");
        option(&mut conv, Action::Shift, "M");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DatesLoaded { epoch, list: date_entries() },
            &config(),
        );
        option(&mut conv, Action::Date, "2025-10-15");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::SlotsLoaded {
                epoch,
                list: vec![slot("CUP-1", "ABC", "Dra. Vega", "09:00", "D")],
            },
            &config(),
        );
        option(&mut conv, Action::Slot, "CUP-1");
        let out = option(&mut conv, Action::Continue, "continue");
        // no yes/no question for a trámite, the text is required
        assert!(conv.awaiting_observation);
        assert!(out.messages[0].text.contains("obligatorio"));
        let out = text(&mut conv, "   ");
        assert!(conv.awaiting_observation);
        assert!(out.messages[0].text.contains("obligatorio"));
        text(&mut conv, "recojo de resultados");
        assert_eq!(conv.step, Step::FinalConfirmation);
    }

    #[test]
    fn test_confirm_builds_expected_submission() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        let out = option(&mut conv, Action::Yes, "yes");
        match &out.effects[0] {
            Effect::Submit { request } => {
                assert_eq!(request.attention_type, "SIS");
                assert_eq!(request.appointment_kind, "CITADO");
                assert_eq!(request.doctor_code, "ABC");
                assert_eq!(request.date, date("2025-10-15"));
                assert_eq!(request.time, "09:00");
                assert_eq!(request.shift, "M");
                assert_eq!(request.slot_id, "CUP-881");
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_decline_at_confirmation_resets_to_greeting() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        let epoch_before = conv.epoch;
        let out = option(&mut conv, Action::No, "no");
        assert_eq!(conv.step, Step::Greeting);
        assert!(conv.patient.is_none());
        assert!(conv.epoch > epoch_before);
        assert!(out.effects.contains(&Effect::CancelSession));
    }

    #[test]
    fn test_submit_accepted_confirms_and_releases_token() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        option(&mut conv, Action::Yes, "yes");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::SubmitAccepted {
                epoch,
                receipt: BookingReceipt { code: "SOL-3311".to_string() },
            },
            &config(),
        );
        assert_eq!(conv.step, Step::AppointmentConfirmed);
        assert_eq!(conv.booking_code.as_deref(), Some("SOL-3311"));
        assert!(out.effects.contains(&Effect::CancelSession));
        assert!(out.messages[0].text.contains("SOL-3311"));
    }

    #[test]
    fn test_submit_rejection_is_terminal_with_reason() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        option(&mut conv, Action::Yes, "yes");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::SubmitRejected {
                epoch,
                reason: Some("el cupo ya fue tomado".to_string()),
            },
            &config(),
        );
        assert_eq!(conv.step, Step::Failed);
        assert!(out.messages[0].text.contains("el cupo ya fue tomado"));
        assert!(out.messages[0].text.contains("(01) 612-4000"));
        assert!(out.effects.contains(&Effect::CancelSession));
    }

    #[test]
    fn test_session_failure_restarts_identity_step() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        let epoch = conv.epoch;
        let out = handle(&mut conv, Event::SessionFailed { epoch }, &config());
        assert_eq!(conv.step, Step::RequestingData);
        assert!(conv.patient.is_none());
        assert!(out.effects.contains(&Effect::LoadDocumentTypes));
    }

    #[test]
    fn test_catalog_failure_keeps_step_and_retry_reissues_query() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        option(&mut conv, Action::PatientType, "SIS");
        option(&mut conv, Action::AppointmentType, "CITADO");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::CatalogFailed { epoch, what: "las especialidades" },
            &config(),
        );
        assert_eq!(conv.step, Step::SelectingSpecialty);
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Retry));
        let out = option(&mut conv, Action::Retry, "retry");
        assert_eq!(out.effects, vec![Effect::LoadSpecialties]);
        assert_eq!(conv.step, Step::SelectingSpecialty);
    }

    #[test]
    fn test_stale_completion_is_dropped_silently() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        option(&mut conv, Action::PatientType, "SIS");
        option(&mut conv, Action::AppointmentType, "CITADO");
        let old_epoch = conv.epoch;
        expire(&mut conv);
        let out = handle(
            &mut conv,
            Event::SpecialtiesLoaded { epoch: old_epoch, list: specialties() },
            &config(),
        );
        assert!(out.messages.is_empty());
        assert!(out.effects.is_empty());
        assert!(conv.offered.specialties.is_empty());
        assert_eq!(conv.step, Step::Greeting);
    }

    #[test]
    fn test_expiry_mid_submission_discards_late_result() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        let out = option(&mut conv, Action::Yes, "yes");
        assert!(matches!(out.effects[0], Effect::Submit { .. }));
        let issue_epoch = conv.epoch;
        // TTL hits zero while the submission is in flight
        expire(&mut conv);
        assert_eq!(conv.step, Step::Greeting);
        assert!(conv.notice.is_some());
        let out = handle(
            &mut conv,
            Event::SubmitAccepted {
                epoch: issue_epoch,
                receipt: BookingReceipt { code: "SOL-9999".to_string() },
            },
            &config(),
        );
        assert!(out.messages.is_empty());
        assert_eq!(conv.step, Step::Greeting);
        assert!(conv.booking_code.is_none());
    }

    #[test]
    fn test_free_text_consults_matcher_once_per_step() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        let out = text(&mut conv, "tengo seguro del estado");
        assert_eq!(
            out.effects,
            vec![Effect::ExtractIntent {
                text: "tengo seguro del estado".to_string(),
                step: Step::SelectingPatientType,
            }]
        );
        // second unrecognized text goes straight to the fallback offer
        let out = text(&mut conv, "no sé qué poner");
        assert!(out.effects.is_empty());
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Restart));
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Abandon));
    }

    #[test]
    fn test_trusted_entity_advances_its_step() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        text(&mut conv, "tengo sis");
        let mut extracted = ExtractedIntent::bare(Intent::Unknown);
        extracted.patient_type = Some("SIS".to_string());
        let epoch = conv.epoch;
        handle(&mut conv, Event::IntentResolved { epoch, extracted }, &config());
        assert_eq!(conv.patient.as_ref().unwrap().patient_type, Some(PatientType::Sis));
        assert_eq!(conv.step, Step::SelectingAppointmentType);
    }

    #[test]
    fn test_entity_for_another_step_is_ignored() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        text(&mut conv, "soy paciente sis");
        let mut extracted = ExtractedIntent::bare(Intent::Unknown);
        extracted.patient_type = Some("SOAT".to_string());
        let epoch = conv.epoch;
        let out = handle(&mut conv, Event::IntentResolved { epoch, extracted }, &config());
        // the already-chosen type stays and the machine offers the fallback
        assert_eq!(conv.patient.as_ref().unwrap().patient_type, Some(PatientType::Sis));
        assert_eq!(conv.step, Step::SelectingSearchMethod);
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Restart));
    }

    #[test]
    fn test_affirmative_intent_confirms_submission() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        text(&mut conv, "sí, envíala por favor");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::IntentResolved {
                epoch,
                extracted: ExtractedIntent::bare(Intent::Affirmative),
            },
            &config(),
        );
        assert!(matches!(out.effects[0], Effect::Submit { .. }));
    }

    #[test]
    fn test_greeting_text_starts_the_flow() {
        let mut conv = new_conv();
        text(&mut conv, "hola buenas tardes");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::IntentResolved {
                epoch,
                extracted: ExtractedIntent::bare(Intent::Greeting),
            },
            &config(),
        );
        assert_eq!(conv.step, Step::RequestingData);
        assert_eq!(out.effects, vec![Effect::LoadDocumentTypes]);
    }

    #[test]
    fn test_matcher_outage_offers_fallback() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        text(&mut conv, "qué opciones hay");
        let epoch = conv.epoch;
        let out = handle(&mut conv, Event::IntentUnavailable { epoch }, &config());
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Restart));
        assert_eq!(conv.step, Step::SelectingPatientType);
    }

    #[test]
    fn test_attachment_accepted_only_after_confirmation() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        let out = handle(
            &mut conv,
            Event::Ui(UiEvent::FileAttached {
                filename: "referencia.pdf".to_string(),
                content_base64: general_purpose::STANDARD.encode(b"pdf"),
            }),
            &config(),
        );
        assert!(out.effects.is_empty());
        option(&mut conv, Action::Yes, "yes");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::SubmitAccepted {
                epoch,
                receipt: BookingReceipt { code: "SOL-1".to_string() },
            },
            &config(),
        );
        let out = handle(
            &mut conv,
            Event::Ui(UiEvent::FileAttached {
                filename: "referencia.pdf".to_string(),
                content_base64: general_purpose::STANDARD.encode(b"pdf"),
            }),
            &config(),
        );
        match &out.effects[0] {
            Effect::AttachReference { booking_code, filename, .. } => {
                assert_eq!(booking_code, "SOL-1");
                assert_eq!(filename, "referencia.pdf");
            }
            other => panic!("unexpected effect: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_attachment_is_rejected_locally() {
        let mut conv = new_conv();
        advance_to_final_confirmation(&mut conv);
        option(&mut conv, Action::Yes, "yes");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::SubmitAccepted {
                epoch,
                receipt: BookingReceipt { code: "SOL-1".to_string() },
            },
            &config(),
        );
        let out = handle(
            &mut conv,
            Event::Ui(UiEvent::FileAttached {
                filename: "referencia.pdf".to_string(),
                content_base64: "###not-base64###".to_string(),
            }),
            &config(),
        );
        assert!(out.effects.is_empty());
        assert!(out.messages[0].text.contains("No pude leer"));
    }

    #[test]
    fn test_stale_button_reprompts_current_step() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        // a leftover patient-type button from an earlier prompt
        let out = option(&mut conv, Action::PatientType, "SOAT");
        assert_eq!(conv.step, Step::SelectingSearchMethod);
        assert_eq!(conv.patient.as_ref().unwrap().patient_type, Some(PatientType::Sis));
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::SearchMethod));
    }

    #[test]
    fn test_empty_slot_result_returns_to_dates() {
        let mut conv = new_conv();
        advance_to_search_method(&mut conv);
        option(&mut conv, Action::SearchMethod, "by-doctor");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DoctorsLoaded {
                epoch,
                list: vec![Doctor { code: "ABC".to_string(), name: "Dra. Vega".to_string() }],
            },
            &config(),
        );
        option(&mut conv, Action::Doctor, "ABC");
        option(&mut conv, Action::Shift, "M");
        let epoch = conv.epoch;
        handle(
            &mut conv,
            Event::DatesLoaded { epoch, list: date_entries() },
            &config(),
        );
        option(&mut conv, Action::Date, "2025-10-15");
        let epoch = conv.epoch;
        let out = handle(
            &mut conv,
            Event::SlotsLoaded { epoch, list: Vec::new() },
            &config(),
        );
        assert!(conv.appointment.date.is_none());
        assert!(out.messages[0].text.contains("Ese día ya no tiene horarios"));
        assert!(out.messages[0].options.iter().any(|c| c.action == Action::Date));
    }

    #[test]
    fn test_abandon_closes_politely() {
        let mut conv = new_conv();
        advance_to_patient_type(&mut conv);
        text(&mut conv, "mmm");
        let epoch = conv.epoch;
        handle(&mut conv, Event::IntentUnavailable { epoch }, &config());
        let out = option(&mut conv, Action::Abandon, "abandon");
        assert_eq!(conv.step, Step::Greeting);
        assert!(conv.patient.is_none());
        assert!(out.effects.contains(&Effect::CancelSession));
    }
}
