use crate::connection::DbPool;
use crate::repositories::RepositoryError;
use serde_json::Value;

/// Demo requests loaded by `backoffice seed`, one or more per workflow kind.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "seed-private-001",
        kind: "private_purchase",
        status: "offer_sent",
        version: 2,
        transition_count: 1,
        document_count: 1,
        payload_field: "client_snapshot",
        description: "Private purchase with the first offer sent",
    },
    SeedRequestContract {
        request_id: "seed-private-002",
        kind: "private_purchase",
        status: "pending_commercial",
        version: 1,
        transition_count: 0,
        document_count: 0,
        payload_field: "client_snapshot",
        description: "Comodato private purchase waiting for backoffice",
    },
    SeedRequestContract {
        request_id: "seed-equipment-001",
        kind: "equipment_purchase",
        status: "waiting_provider_response",
        version: 1,
        transition_count: 0,
        document_count: 0,
        payload_field: "provider_email",
        description: "Equipment purchase awaiting the provider's stock answer",
    },
    SeedRequestContract {
        request_id: "seed-client-001",
        kind: "client_request",
        status: "pending_approval",
        version: 1,
        transition_count: 0,
        document_count: 0,
        payload_field: "ruc_cedula",
        description: "Client registration with consent captured in person",
    },
    SeedRequestContract {
        request_id: "seed-permit-001",
        kind: "permit",
        status: "pending",
        version: 1,
        transition_count: 0,
        document_count: 0,
        payload_field: "assessment",
        description: "Two-day sick leave waiting for the line manager",
    },
    SeedRequestContract {
        request_id: "seed-permit-002",
        kind: "permit",
        status: "partially_approved",
        version: 2,
        transition_count: 1,
        document_count: 0,
        payload_field: "assessment",
        description: "Study permit approved by the supervisor, justification pending",
    },
];

pub struct SeedDataset;

impl SeedDataset {
    pub const SQL: &'static str = include_str!("../../../config/fixtures/seed_requests.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(Self::SQL).execute(&mut *tx).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|contract| SeedRequestInfo {
                request_id: contract.request_id,
                kind: contract.kind,
                description: contract.description,
            })
            .collect();

        Ok(SeedResult { requests_seeded })
    }

    /// Checks every seeded record against its contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(SEED_REQUESTS.len());

        for contract in SEED_REQUESTS {
            checks.push((contract.request_id, Self::verify_one(pool, contract).await?));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }

    async fn verify_one(
        pool: &DbPool,
        contract: &SeedRequestContract,
    ) -> Result<bool, RepositoryError> {
        let payload: Option<String> = sqlx::query_scalar(
            "SELECT payload_json FROM request WHERE id = ?1 AND kind = ?2 AND status = ?3 AND version = ?4",
        )
        .bind(contract.request_id)
        .bind(contract.kind)
        .bind(contract.status)
        .bind(contract.version)
        .fetch_optional(pool)
        .await?;
        let Some(payload) = payload else {
            return Ok(false);
        };

        let payload: Value = serde_json::from_str(&payload)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        if payload.get(contract.payload_field).is_none() {
            return Ok(false);
        }

        let transitions: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM request_transition WHERE request_id = ?1")
                .bind(contract.request_id)
                .fetch_one(pool)
                .await?;
        let documents: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM request_document WHERE request_id = ?1")
                .bind(contract.request_id)
                .fetch_one(pool)
                .await?;

        Ok(transitions == contract.transition_count && documents == contract.document_count)
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let ids = sql_array_from_ids(
            &SEED_REQUESTS.iter().map(|contract| contract.request_id).collect::<Vec<_>>(),
        );
        let mut tx = pool.begin().await?;
        for table in ["request_document", "request_transition", "consent_token"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE request_id IN {ids}"))
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query(&format!("DELETE FROM request WHERE id IN {ids}")).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    request_id: &'static str,
    kind: &'static str,
    status: &'static str,
    version: i64,
    transition_count: i64,
    document_count: i64,
    payload_field: &'static str,
    description: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<SeedRequestInfo>,
}

#[derive(Debug)]
pub struct SeedRequestInfo {
    pub request_id: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
