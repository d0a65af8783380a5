use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use validator::ValidateEmail;

use crate::errors::FieldErrors;
use crate::models::availability::{is_valid_time, parse_slot_date};
use crate::models::{AvailabilitySlot, FuelType, NewRepair, RepairUpdate, Transmission, WorkType};

static REG_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}-[0-9]{3}[A-Z]{2}$").expect("valid regex"));
static POSTCODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("valid regex"));
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{4}$").expect("valid regex"));
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("valid regex"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]{11}$").expect("valid regex"));

pub const MIN_YEAR: i32 = 1990;
pub const MIN_PROBLEM_DESCRIPTION: usize = 10;

/// Raw booking form as the client submits it. Every field defaults so that a
/// partially filled draft can still be checked one stage at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepairForm {
    pub reg_number: String,
    pub postcode: String,
    pub make: String,
    pub model: String,
    #[serde(deserialize_with = "string_or_number")]
    pub year: String,
    pub transmission: String,
    pub fuel_type: String,
    #[serde(deserialize_with = "optional_string_or_number")]
    pub mileage: Option<String>,
    pub work_types: Vec<String>,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address1: String,
    pub address2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub problem_description: String,
    pub availability: Vec<SlotInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotInput {
    pub date: String,
    pub start: String,
    pub end: String,
}

/// The four wizard stages, in order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FormStage {
    Vehicle,
    Work,
    Details,
    Review,
}

impl FormStage {
    pub const ALL: [FormStage; 4] = [
        FormStage::Vehicle,
        FormStage::Work,
        FormStage::Details,
        FormStage::Review,
    ];

    pub fn index(&self) -> usize {
        match self {
            FormStage::Vehicle => 0,
            FormStage::Work => 1,
            FormStage::Details => 2,
            FormStage::Review => 3,
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn prev(&self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn label(&self) -> &'static str {
        match self {
            FormStage::Vehicle => "Car",
            FormStage::Work => "Select work",
            FormStage::Details => "Details",
            FormStage::Review => "Booking",
        }
    }

    /// Accepts the stage name or its zero-based index.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vehicle" | "0" => Some(FormStage::Vehicle),
            "work" | "1" => Some(FormStage::Work),
            "details" | "2" => Some(FormStage::Details),
            "review" | "3" => Some(FormStage::Review),
            _ => None,
        }
    }
}

/// Non-binding price range in naira.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceEstimate {
    pub low: u64,
    pub high: u64,
}

/// Sums the range of every distinct selected work type.
pub fn price_estimate(work_types: &[WorkType]) -> PriceEstimate {
    let mut seen = Vec::with_capacity(work_types.len());
    work_types.iter().fold(PriceEstimate::default(), |acc, w| {
        if seen.contains(w) {
            return acc;
        }
        seen.push(*w);
        let (low, high) = w.price_range();
        PriceEstimate {
            low: acc.low + low,
            high: acc.high + high,
        }
    })
}

/// Estimate for raw selections; unknown names contribute nothing.
pub fn estimate_for_names<S: AsRef<str>>(names: &[S]) -> PriceEstimate {
    let work_types: Vec<WorkType> = names
        .iter()
        .filter_map(|n| WorkType::parse(n.as_ref()))
        .collect();
    price_estimate(&work_types)
}

pub fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Checks the field group of one stage. `Review` checks every group, since
/// leaving it means submitting.
pub fn validate_stage(form: &RepairForm, stage: FormStage) -> Result<(), FieldErrors> {
    validate_stage_in_year(form, stage, current_year())
}

pub fn validate_stage_in_year(
    form: &RepairForm,
    stage: FormStage,
    current_year: i32,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    match stage {
        FormStage::Vehicle => {
            check_vehicle(form, current_year, &mut errors);
        }
        FormStage::Work => {
            check_work(form, &mut errors);
        }
        FormStage::Details => {
            check_details(form, &mut errors);
        }
        FormStage::Review => {
            check_vehicle(form, current_year, &mut errors);
            check_work(form, &mut errors);
            check_details(form, &mut errors);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates the whole form and produces the typed submission.
pub fn validate_form(form: &RepairForm) -> Result<NewRepair, FieldErrors> {
    validate_form_in_year(form, current_year())
}

pub fn validate_form_in_year(form: &RepairForm, current_year: i32) -> Result<NewRepair, FieldErrors> {
    let mut errors = FieldErrors::new();
    let vehicle = check_vehicle(form, current_year, &mut errors);
    let work_types = check_work(form, &mut errors);
    let availability = check_details(form, &mut errors);

    match vehicle {
        Some(vehicle) if errors.is_empty() => Ok(NewRepair {
            reg_number: form.reg_number.clone(),
            postcode: form.postcode.clone(),
            make: form.make.trim().to_string(),
            model: form.model.trim().to_string(),
            year: vehicle.year,
            transmission: vehicle.transmission,
            fuel_type: vehicle.fuel_type,
            mileage: vehicle.mileage,
            work_types,
            full_name: form.full_name.trim().to_string(),
            phone: form.phone.clone(),
            email: form.email.trim().to_string(),
            address1: form.address1.trim().to_string(),
            address2: form
                .address2
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            city: form.city.trim().to_string(),
            state: form.state.trim().to_string(),
            country: form.country.trim().to_string(),
            problem_description: form.problem_description.trim().to_string(),
            availability,
        }),
        _ => Err(errors),
    }
}

/// Checks the owner-editable fields that are present. Keys use the stored
/// column names, matching the update payload.
pub fn validate_update(update: &RepairUpdate, current_year: i32) -> Result<RepairUpdate, FieldErrors> {
    let mut errors = FieldErrors::new();

    let full_name = update.full_name.as_deref().map(str::trim);
    if let Some(name) = full_name {
        check_min_len(&mut errors, "full_name", name, 2, "Name is required");
    }
    if let Some(phone) = update.phone.as_deref() {
        check(&mut errors, "phone", PHONE.is_match(phone), "Phone must be 11 digits");
    }
    let description = update.problem_description.as_deref().map(str::trim);
    if let Some(description) = description {
        check_min_len(
            &mut errors,
            "problem_description",
            description,
            MIN_PROBLEM_DESCRIPTION,
            "Please describe the problem",
        );
    }
    if let Some(year) = update.year {
        check(
            &mut errors,
            "year",
            (MIN_YEAR..=current_year).contains(&year),
            "Enter a valid year (1990 - current)",
        );
    }

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(RepairUpdate {
        full_name: full_name.map(str::to_string),
        phone: update.phone.clone(),
        problem_description: description.map(str::to_string),
        year: update.year,
    })
}

/// Mechanic application text fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanicForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub postcode: String,
    pub address: Option<String>,
}

pub fn validate_mechanic_form(
    form: &MechanicForm,
    report_content_type: Option<&str>,
    report_len: usize,
) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    check_min_len(&mut errors, "firstName", form.first_name.trim(), 2, "First name is required");
    check_min_len(&mut errors, "lastName", form.last_name.trim(), 2, "Last name is required");
    check(
        &mut errors,
        "email",
        form.email.trim().validate_email(),
        "Invalid email address",
    );
    check_min_len(&mut errors, "phone", form.phone.trim(), 8, "Phone number is required");
    check_min_len(&mut errors, "postcode", form.postcode.trim(), 3, "Postcode is required");

    match report_content_type {
        None => {
            check(&mut errors, "policeReport", false, "Police report is required");
        }
        Some(_) if report_len == 0 => {
            check(&mut errors, "policeReport", false, "Police report is required");
        }
        Some(content_type) => {
            check(
                &mut errors,
                "policeReport",
                content_type == "application/pdf",
                "Only PDF files are allowed",
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

struct Vehicle {
    year: i32,
    transmission: Transmission,
    fuel_type: FuelType,
    mileage: Option<i64>,
}

fn check_vehicle(form: &RepairForm, current_year: i32, errors: &mut FieldErrors) -> Option<Vehicle> {
    check(
        errors,
        "regNumber",
        REG_NUMBER.is_match(&form.reg_number),
        "Invalid Nigerian plate (e.g., ABC-123DE)",
    );
    check(
        errors,
        "postcode",
        POSTCODE.is_match(&form.postcode),
        "Must be a 6-digit Nigerian postal code",
    );
    check_min_len(errors, "make", form.make.trim(), 1, "Car make is required");
    check_min_len(errors, "model", form.model.trim(), 1, "Car model is required");

    let year = if YEAR.is_match(&form.year) {
        form.year
            .parse::<i32>()
            .ok()
            .filter(|y| (MIN_YEAR..=current_year).contains(y))
            .or_else(|| {
                check(errors, "year", false, "Enter a valid year (1990 - current)");
                None
            })
    } else {
        check(errors, "year", false, "Year must be 4 digits");
        None
    };

    let transmission = Transmission::parse(&form.transmission);
    check(errors, "transmission", transmission.is_some(), "Select transmission");
    let fuel_type = FuelType::parse(&form.fuel_type);
    check(errors, "fuelType", fuel_type.is_some(), "Select fuel type");

    // A blank mileage input means the field was left out.
    let mileage = match form.mileage.as_deref().map(str::trim) {
        None | Some("") => Some(None),
        Some(m) if DIGITS.is_match(m) => m.parse::<i64>().ok().map(Some),
        Some(_) => None,
    };
    check(errors, "mileage", mileage.is_some(), "Mileage must be numeric (km)");

    Some(Vehicle {
        year: year?,
        transmission: transmission?,
        fuel_type: fuel_type?,
        mileage: mileage?,
    })
}

fn check_work(form: &RepairForm, errors: &mut FieldErrors) -> Vec<WorkType> {
    if form.work_types.is_empty() {
        check(errors, "workTypes", false, "Select at least one work type");
        return vec![];
    }

    let mut work_types = Vec::with_capacity(form.work_types.len());
    for name in &form.work_types {
        match WorkType::parse(name) {
            Some(w) if !work_types.contains(&w) => work_types.push(w),
            Some(_) => {}
            None => check(
                errors,
                "workTypes",
                false,
                "Work type must be one of Repair, Diagnostics, Servicing, MOT",
            ),
        }
    }
    work_types
}

fn check_details(form: &RepairForm, errors: &mut FieldErrors) -> Vec<AvailabilitySlot> {
    check_min_len(errors, "fullName", form.full_name.trim(), 2, "Name is required");
    check(errors, "phone", PHONE.is_match(&form.phone), "Phone must be 11 digits");
    check(
        errors,
        "email",
        form.email.trim().validate_email(),
        "Enter a valid email",
    );
    check_min_len(errors, "address1", form.address1.trim(), 3, "Address line 1 is required");
    check_min_len(errors, "city", form.city.trim(), 2, "City is required");
    check_min_len(errors, "state", form.state.trim(), 2, "State is required");
    check_min_len(errors, "country", form.country.trim(), 2, "Country is required");
    check_min_len(
        errors,
        "problemDescription",
        form.problem_description.trim(),
        MIN_PROBLEM_DESCRIPTION,
        "Please describe the problem",
    );

    if form.availability.is_empty() {
        check(errors, "availability", false, "Select at least one availability slot");
        return vec![];
    }

    let mut slots = Vec::with_capacity(form.availability.len());
    for (i, slot) in form.availability.iter().enumerate() {
        let date = parse_slot_date(&slot.date);
        check(errors, &format!("availability.{i}.date"), date.is_some(), "Date is required");

        let start_ok = is_valid_time(&slot.start);
        let end_ok = is_valid_time(&slot.end);
        check(errors, &format!("availability.{i}.start"), start_ok, "Start time is required");
        check(errors, &format!("availability.{i}.end"), end_ok, "End time is required");

        // Fixed-width HH:MM compares correctly as plain strings.
        let ordered = slot.start < slot.end;
        if start_ok && end_ok {
            check(
                errors,
                &format!("availability.{i}"),
                ordered,
                "End time must be after start time",
            );
        }

        if let (Some(date), true, true, true) = (date, start_ok, end_ok, ordered) {
            slots.push(AvailabilitySlot {
                date,
                start: slot.start.clone(),
                end: slot.end.clone(),
            });
        }
    }
    slots
}

/// Records `message` for `field` unless `ok`; only the first message per
/// field is kept.
fn check(errors: &mut FieldErrors, field: &str, ok: bool, message: &str) {
    if !ok {
        errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }
}

fn check_min_len(errors: &mut FieldErrors, field: &str, value: &str, min: usize, message: &str) {
    check(errors, field, value.chars().count() >= min, message);
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_string_or_number(deserializer)?.unwrap_or_default())
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Number(n)) => Some(n.to_string()),
        None => None,
    })
}
