use std::collections::HashMap;

use serde::Serialize;

use crate::errors::{AppError, FieldErrors};
use crate::models::availability;
use crate::models::{NewRepair, WorkType};
use crate::services::validation::{self, FormStage, PriceEstimate, RepairForm};

/// Summary shown on the review stage.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReviewSummary {
    pub vehicle: String,
    pub work_types: Vec<WorkType>,
    pub availability: String,
    pub estimate: PriceEstimate,
}

/// Cursor over the four booking stages plus the in-flight operation flags a
/// client shows spinners for.
#[derive(Debug, Clone)]
pub struct BookingWizard {
    stage: FormStage,
    form: RepairForm,
    current_year: i32,
    in_flight: HashMap<String, bool>,
}

impl Default for BookingWizard {
    fn default() -> Self {
        Self::new(RepairForm::default())
    }
}

impl BookingWizard {
    pub fn new(form: RepairForm) -> Self {
        Self::at(FormStage::Vehicle, form)
    }

    pub fn at(stage: FormStage, form: RepairForm) -> Self {
        Self {
            stage,
            form,
            current_year: validation::current_year(),
            in_flight: HashMap::new(),
        }
    }

    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn stage(&self) -> FormStage {
        self.stage
    }

    pub fn form(&self) -> &RepairForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RepairForm {
        &mut self.form
    }

    /// Validates the current stage and moves forward when it passes. On the
    /// review stage this re-checks everything and stays put.
    pub fn next(&mut self) -> Result<FormStage, FieldErrors> {
        validation::validate_stage_in_year(&self.form, self.stage, self.current_year)?;
        if let Some(next) = self.stage.next() {
            self.stage = next;
        }
        Ok(self.stage)
    }

    /// Steps back without validating.
    pub fn back(&mut self) -> FormStage {
        if let Some(prev) = self.stage.prev() {
            self.stage = prev;
        }
        self.stage
    }

    pub fn estimate(&self) -> PriceEstimate {
        validation::estimate_for_names(&self.form.work_types)
    }

    pub fn summary(&self) -> ReviewSummary {
        let work_types: Vec<WorkType> = self
            .form
            .work_types
            .iter()
            .filter_map(|w| WorkType::parse(w))
            .fold(vec![], |mut acc, w| {
                if !acc.contains(&w) {
                    acc.push(w);
                }
                acc
            });

        let slots: Vec<_> = self
            .form
            .availability
            .iter()
            .filter_map(|s| {
                Some(crate::models::AvailabilitySlot {
                    date: availability::parse_slot_date(&s.date)?,
                    start: s.start.clone(),
                    end: s.end.clone(),
                })
            })
            .collect();

        ReviewSummary {
            vehicle: format!(
                "{} {} {} ({})",
                self.form.year, self.form.make, self.form.model, self.form.reg_number
            ),
            work_types,
            availability: availability::to_human_readable(&slots),
            estimate: self.estimate(),
        }
    }

    /// Produces the validated submission. Only allowed from the review stage,
    /// and not while a previous submit is still in flight.
    pub fn submit(&mut self) -> Result<NewRepair, AppError> {
        if self.stage != FormStage::Review {
            return Err(AppError::State(format!(
                "cannot submit from the {} stage",
                self.stage.label()
            )));
        }
        if self.is_in_flight("submit") {
            return Err(AppError::State("submission already in progress".into()));
        }
        validation::validate_form_in_year(&self.form, self.current_year)
            .map_err(AppError::Validation)
    }

    pub fn set_in_flight(&mut self, operation: &str, busy: bool) {
        self.in_flight.insert(operation.to_string(), busy);
    }

    pub fn is_in_flight(&self, operation: &str) -> bool {
        self.in_flight.get(operation).copied().unwrap_or(false)
    }

    pub fn any_in_flight(&self) -> bool {
        self.in_flight.values().any(|busy| *busy)
    }
}
