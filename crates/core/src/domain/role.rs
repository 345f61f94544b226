use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DomainError;

/// Organizational role carried by the acting user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Comercial,
    JefeComercial,
    BackofficeComercial,
    AcpComercial,
    Gerencia,
    TalentoHumano,
    JefeServicioTecnico,
    Tecnico,
    Admin,
    /// External party acting through a single-use consent link.
    Client,
    Employee,
}

impl Role {
    pub const ALL: [Role; 11] = [
        Role::Comercial,
        Role::JefeComercial,
        Role::BackofficeComercial,
        Role::AcpComercial,
        Role::Gerencia,
        Role::TalentoHumano,
        Role::JefeServicioTecnico,
        Role::Tecnico,
        Role::Admin,
        Role::Client,
        Role::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Comercial => "comercial",
            Role::JefeComercial => "jefe_comercial",
            Role::BackofficeComercial => "backoffice_comercial",
            Role::AcpComercial => "acp_comercial",
            Role::Gerencia => "gerencia",
            Role::TalentoHumano => "talento_humano",
            Role::JefeServicioTecnico => "jefe_servicio_tecnico",
            Role::Tecnico => "tecnico",
            Role::Admin => "admin",
            Role::Client => "client",
            Role::Employee => "employee",
        }
    }

    pub fn is_super(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let key = normalize_role_name(raw);
        if key.is_empty() {
            return Err(DomainError::Validation("actor role is required".to_string()));
        }

        let role = match key.as_str() {
            "comercial" | "asesor_comercial" => Role::Comercial,
            "jefe_comercial" | "jefe_de_comercial" => Role::JefeComercial,
            "backoffice_comercial" => Role::BackofficeComercial,
            "acp_comercial" => Role::AcpComercial,
            "gerencia" | "gerente_general" | "director" => Role::Gerencia,
            "talento_humano" | "jefe_talento_humano" | "jefe_de_talento_humano"
            | "analista_talento_humano" => Role::TalentoHumano,
            "jefe_servicio_tecnico" | "jefe_de_servicio_tecnico" | "jefe_tecnico"
            | "jefe_de_tecnico" => Role::JefeServicioTecnico,
            "tecnico" | "servicio_tecnico" => Role::Tecnico,
            "admin" | "administrador" => Role::Admin,
            "client" | "cliente" => Role::Client,
            _ => Role::Employee,
        };
        Ok(role)
    }
}

fn normalize_role_name(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    let mut normalized = String::with_capacity(lowered.len());
    let mut last_was_separator = false;
    for ch in lowered.chars() {
        if ch == ' ' || ch == '-' || ch == '_' {
            if !last_was_separator && !normalized.is_empty() {
                normalized.push('_');
            }
            last_was_separator = true;
        } else {
            normalized.push(ch);
            last_was_separator = false;
        }
    }
    normalized.trim_end_matches('_').to_string()
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::parse(value)
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A set of roles allowed to perform an action. Admin always passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleSet {
    Any,
    Only(&'static [Role]),
}

impl RoleSet {
    pub fn admits(&self, role: Role) -> bool {
        if role.is_super() {
            return true;
        }
        match self {
            RoleSet::Any => true,
            RoleSet::Only(roles) => roles.contains(&role),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            RoleSet::Any => "any".to_string(),
            RoleSet::Only(roles) => {
                roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
            }
        }
    }
}

/// Identity of whoever performs an operation, captured on every record it touches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), email: email.into(), role }
    }

    pub fn same_person(&self, other: &Actor) -> bool {
        self.id == other.id || (!self.email.is_empty() && self.email.eq_ignore_ascii_case(&other.email))
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Role, RoleSet};

    #[test]
    fn aliases_fold_to_canonical_roles() {
        assert_eq!(Role::parse("Jefe de Comercial").unwrap(), Role::JefeComercial);
        assert_eq!(Role::parse("gerente-general").unwrap(), Role::Gerencia);
        assert_eq!(Role::parse(" ADMINISTRADOR ").unwrap(), Role::Admin);
        assert_eq!(Role::parse("servicio_tecnico").unwrap(), Role::Tecnico);
        assert_eq!(Role::parse("analista_talento_humano").unwrap(), Role::TalentoHumano);
    }

    #[test]
    fn unknown_roles_become_employee_and_empty_is_rejected() {
        assert_eq!(Role::parse("contador").unwrap(), Role::Employee);
        assert!(Role::parse("   ").is_err());
    }

    #[test]
    fn admin_passes_every_role_set() {
        let only_backoffice = RoleSet::Only(&[Role::BackofficeComercial]);
        assert!(only_backoffice.admits(Role::Admin));
        assert!(only_backoffice.admits(Role::BackofficeComercial));
        assert!(!only_backoffice.admits(Role::Comercial));
        assert!(RoleSet::Any.admits(Role::Employee));
    }

    #[test]
    fn roles_serialize_as_snake_case_strings() {
        let json = serde_json::to_string(&Role::AcpComercial).unwrap();
        assert_eq!(json, "\"acp_comercial\"");
        let parsed: Role = serde_json::from_str("\"jefe_de_comercial\"").unwrap();
        assert_eq!(parsed, Role::JefeComercial);
    }

    #[test]
    fn same_person_matches_by_id_or_email() {
        let a = Actor::new("u-1", "ana@example.com", Role::Employee);
        let b = Actor::new("u-9", "ANA@example.com", Role::Employee);
        let c = Actor::new("u-2", "luis@example.com", Role::Employee);
        assert!(a.same_person(&b));
        assert!(!a.same_person(&c));
    }
}
