//! Typed views over request payloads.
//!
//! The stored payload stays the caller's JSON; these views only validate the
//! fields the workflow depends on.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    #[serde(default)]
    pub commercial_name: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_type: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferKind {
    #[default]
    Venta,
    Comodato,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivatePurchasePayload {
    #[serde(default, alias = "clientSnapshot")]
    pub client_snapshot: ClientSnapshot,
    #[serde(default)]
    pub equipment: Vec<serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub offer_kind: OfferKind,
}

impl PrivatePurchasePayload {
    pub fn client_name(&self) -> Option<&str> {
        self.client_snapshot
            .commercial_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EquipmentPurchasePayload {
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub equipment: Vec<serde_json::Value>,
    #[serde(default)]
    pub provider_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl EquipmentPurchasePayload {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.client_name.trim().is_empty() || self.equipment.is_empty() {
            return Err(DomainError::Validation(
                "client_name and at least one equipment item are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn has_provider(&self) -> bool {
        self.provider_email.as_deref().is_some_and(|email| !email.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequestPayload {
    pub commercial_name: String,
    pub ruc_cedula: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub consent_captured: bool,
}

impl ClientRequestPayload {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.commercial_name.trim().is_empty() {
            return Err(DomainError::Validation("commercial_name is required".to_string()));
        }
        let id = self.ruc_cedula.trim();
        if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(DomainError::Validation(
                "ruc_cedula must be a non-empty string of digits".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitRequestType {
    #[default]
    Permiso,
    Vacaciones,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermitType {
    Estudios,
    Personal,
    Salud,
    Calamidad,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalamitySubtype {
    Fallecimiento,
    Accidente,
    Desastre,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitPayload {
    #[serde(default)]
    pub request_type: PermitRequestType,
    #[serde(default)]
    pub permit_type: Option<PermitType>,
    #[serde(default)]
    pub calamity_subtype: Option<CalamitySubtype>,
    #[serde(default)]
    pub duration_hours: Option<Decimal>,
    #[serde(default)]
    pub duration_days: Option<Decimal>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// Reads a typed view out of a raw payload, reporting the first bad field.
pub fn view<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, DomainError> {
    T::deserialize(payload)
        .map_err(|error| DomainError::Validation(format!("invalid payload: {error}")))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{
        view, ClientRequestPayload, EquipmentPurchasePayload, OfferKind, PermitPayload,
        PermitType, PrivatePurchasePayload,
    };

    #[test]
    fn private_purchase_accepts_camel_case_snapshot_alias() {
        let payload: PrivatePurchasePayload = view(&json!({
            "clientSnapshot": {"commercial_name": "  Laboratorio Andes  "},
            "offer_kind": "comodato",
        }))
        .expect("valid payload");

        assert_eq!(payload.client_name(), Some("Laboratorio Andes"));
        assert_eq!(payload.offer_kind, OfferKind::Comodato);
    }

    #[test]
    fn equipment_purchase_requires_client_and_items() {
        let payload: EquipmentPurchasePayload =
            view(&json!({"client_name": "Hospital Sur", "equipment": []})).expect("parses");
        assert!(payload.validate().is_err());

        let payload: EquipmentPurchasePayload = view(&json!({
            "client_name": "Hospital Sur",
            "equipment": [{"sku": "AN-200"}],
            "provider_email": " ",
        }))
        .expect("parses");
        assert!(payload.validate().is_ok());
        assert!(!payload.has_provider());
    }

    #[test]
    fn client_request_rejects_non_numeric_identifier() {
        let payload: ClientRequestPayload =
            view(&json!({"commercial_name": "Farmacia Uno", "ruc_cedula": "17-9"}))
                .expect("parses");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn permit_payload_parses_decimal_hours() {
        let payload: PermitPayload = view(&json!({
            "permit_type": "personal",
            "duration_hours": "1.5",
            "start_date": "2026-03-04",
        }))
        .expect("parses");

        assert_eq!(payload.permit_type, Some(PermitType::Personal));
        assert_eq!(payload.duration_hours, Some(Decimal::new(15, 1)));
    }
}
