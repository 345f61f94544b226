//! Leave and permit rules checked before a permit request is accepted.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::payload::{CalamitySubtype, PermitPayload, PermitRequestType, PermitType};
use crate::errors::DomainError;

const MAX_STUDY_HOURS: i64 = 3;
const MAX_PERSONAL_HOURS_PER_WEEK: i64 = 2;
const IESS_THRESHOLD_DAYS: i64 = 4;
const MAX_BEREAVEMENT_DAYS: i64 = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitAssessment {
    pub required_evidence: Vec<String>,
    pub recoverable: bool,
    pub requires_iess_filing: bool,
}

impl PermitAssessment {
    fn evidence(items: &[&str]) -> Self {
        Self {
            required_evidence: items.iter().map(|item| (*item).to_string()).collect(),
            ..Self::default()
        }
    }
}

/// A personal permit the same employee already holds, used for the weekly cap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriorPersonalPermit {
    pub start_date: NaiveDate,
    pub duration_hours: Decimal,
}

pub fn assess(
    payload: &PermitPayload,
    prior_personal: &[PriorPersonalPermit],
) -> Result<PermitAssessment, DomainError> {
    if payload.request_type == PermitRequestType::Vacaciones {
        return Ok(PermitAssessment::default());
    }

    let Some(permit_type) = payload.permit_type else {
        return Err(DomainError::Validation("permit_type is required".to_string()));
    };

    match permit_type {
        PermitType::Estudios => {
            let hours = payload.duration_hours.unwrap_or_default();
            if hours > Decimal::from(MAX_STUDY_HOURS) {
                return Err(DomainError::Validation(format!(
                    "study permits cannot exceed {MAX_STUDY_HOURS} hours"
                )));
            }
            Ok(PermitAssessment {
                recoverable: true,
                ..PermitAssessment::evidence(&["certificado_institucion"])
            })
        }
        PermitType::Personal => {
            let Some(start) = payload.start_date else {
                return Err(DomainError::Validation(
                    "start_date is required for personal permits".to_string(),
                ));
            };
            let (week_start, week_end) = week_bounds(start);
            let used: Decimal = prior_personal
                .iter()
                .filter(|prior| prior.start_date >= week_start && prior.start_date <= week_end)
                .map(|prior| prior.duration_hours)
                .sum();
            let requested = payload.duration_hours.unwrap_or_default();
            if used + requested > Decimal::from(MAX_PERSONAL_HOURS_PER_WEEK) {
                return Err(DomainError::Validation(format!(
                    "{used} personal hours already used this week; the weekly maximum is {MAX_PERSONAL_HOURS_PER_WEEK}"
                )));
            }
            Ok(PermitAssessment::evidence(&["evidencia_general"]))
        }
        PermitType::Salud => {
            let days = payload.duration_days.unwrap_or_default();
            if days < Decimal::from(IESS_THRESHOLD_DAYS) {
                Ok(PermitAssessment::evidence(&["certificado_medico"]))
            } else {
                Ok(PermitAssessment {
                    requires_iess_filing: true,
                    ..PermitAssessment::evidence(&["certificado_medico_iess"])
                })
            }
        }
        PermitType::Calamidad => {
            let days = payload.duration_days.unwrap_or_default();
            match payload.calamity_subtype {
                Some(CalamitySubtype::Fallecimiento) => {
                    if days > Decimal::from(MAX_BEREAVEMENT_DAYS) {
                        return Err(DomainError::Validation(format!(
                            "bereavement permits cannot exceed {MAX_BEREAVEMENT_DAYS} days"
                        )));
                    }
                    Ok(PermitAssessment::evidence(&["certificado_defuncion", "documento_parentesco"]))
                }
                Some(CalamitySubtype::Accidente) => {
                    Ok(PermitAssessment::evidence(&["certificado_medico_familiar"]))
                }
                Some(CalamitySubtype::Desastre) => {
                    Ok(PermitAssessment::evidence(&["evidencia_fotografica"]))
                }
                None => Err(DomainError::Validation(
                    "calamity_subtype is required for calamity permits".to_string(),
                )),
            }
        }
    }
}

/// Sunday-to-Saturday week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = i64::from(date.weekday().num_days_from_sunday());
    let start = date - Duration::days(offset);
    (start, start + Duration::days(6))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{assess, week_bounds, PriorPersonalPermit};
    use crate::domain::payload::{
        CalamitySubtype, PermitPayload, PermitRequestType, PermitType,
    };

    fn permit(permit_type: PermitType) -> PermitPayload {
        PermitPayload {
            request_type: PermitRequestType::Permiso,
            permit_type: Some(permit_type),
            calamity_subtype: None,
            duration_hours: None,
            duration_days: None,
            start_date: None,
            end_date: None,
        }
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn study_permits_are_capped_and_recoverable() {
        let mut payload = permit(PermitType::Estudios);
        payload.duration_hours = Some(Decimal::from(3));
        let assessment = assess(&payload, &[]).expect("three hours allowed");
        assert!(assessment.recoverable);
        assert_eq!(assessment.required_evidence, vec!["certificado_institucion".to_string()]);

        payload.duration_hours = Some(Decimal::new(35, 1));
        assert!(assess(&payload, &[]).is_err());
    }

    #[test]
    fn personal_hours_are_capped_per_sunday_week() {
        let mut payload = permit(PermitType::Personal);
        payload.start_date = Some(date("2026-03-05"));
        payload.duration_hours = Some(Decimal::from(1));

        let same_week = [PriorPersonalPermit {
            start_date: date("2026-03-01"),
            duration_hours: Decimal::new(15, 1),
        }];
        assert!(assess(&payload, &same_week).is_err());

        let previous_week = [PriorPersonalPermit {
            start_date: date("2026-02-28"),
            duration_hours: Decimal::from(2),
        }];
        assert!(assess(&payload, &previous_week).is_ok());
    }

    #[test]
    fn personal_permit_needs_start_date() {
        assert!(assess(&permit(PermitType::Personal), &[]).is_err());
    }

    #[test]
    fn long_sick_leave_requires_iess_filing() {
        let mut payload = permit(PermitType::Salud);
        payload.duration_days = Some(Decimal::from(2));
        assert!(!assess(&payload, &[]).expect("short leave").requires_iess_filing);

        payload.duration_days = Some(Decimal::from(4));
        let assessment = assess(&payload, &[]).expect("long leave");
        assert!(assessment.requires_iess_filing);
        assert_eq!(assessment.required_evidence, vec!["certificado_medico_iess".to_string()]);
    }

    #[test]
    fn calamity_requires_known_subtype_and_caps_bereavement() {
        let mut payload = permit(PermitType::Calamidad);
        assert!(assess(&payload, &[]).is_err());

        payload.calamity_subtype = Some(CalamitySubtype::Fallecimiento);
        payload.duration_days = Some(Decimal::from(4));
        assert!(assess(&payload, &[]).is_err());

        payload.duration_days = Some(Decimal::from(3));
        let assessment = assess(&payload, &[]).expect("three days allowed");
        assert_eq!(assessment.required_evidence.len(), 2);
    }

    #[test]
    fn vacation_requests_skip_permit_rules() {
        let payload = PermitPayload {
            request_type: PermitRequestType::Vacaciones,
            permit_type: None,
            calamity_subtype: None,
            duration_hours: None,
            duration_days: Some(Decimal::from(10)),
            start_date: None,
            end_date: None,
        };
        assert!(assess(&payload, &[]).expect("vacations pass").required_evidence.is_empty());
    }

    #[test]
    fn week_bounds_start_on_sunday() {
        let (start, end) = week_bounds(date("2026-03-05"));
        assert_eq!(start, date("2026-03-01"));
        assert_eq!(end, date("2026-03-07"));
    }
}
