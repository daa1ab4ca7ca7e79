use diesel::{
    BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl, QueryResult,
    SelectableHelper,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use reqwest::Client;

use crate::{
    api::{ApiUrls, ocr},
    app_error::AppError,
    domain::{
        prescriptions::{GateCandidate, GateDecision, VerificationOutcome, evaluate_gate},
        roles::{Actor, Role},
    },
    models::{CreatePrescriptionEntity, PrescriptionEntity},
    schema::{cart_items, carts, medicines, orders, prescriptions},
};

/// Names of prescription-only medicines currently in the patient's cart.
async fn required_medicine_names(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
) -> QueryResult<Vec<String>> {
    cart_items::table
        .inner_join(carts::table)
        .inner_join(medicines::table)
        .filter(carts::patient_id.eq(patient_id))
        .filter(medicines::prescription_required.eq(true))
        .order(cart_items::id.asc())
        .select(medicines::name)
        .load(conn)
        .await
}

/// Stores an uploaded prescription and attempts automatic verification.
///
/// The prescription is persisted unverified first; OCR runs afterwards with no
/// transaction open. OCR failure or unmatched names leave it unverified for
/// manual review and are reported through the returned outcome.
pub async fn upload(
    conn: &mut AsyncPgConnection,
    client: &Client,
    urls: &ApiUrls,
    patient_id: i32,
    uploaded_file: String,
) -> Result<(PrescriptionEntity, VerificationOutcome), AppError> {
    if uploaded_file.trim().is_empty() {
        return Err(AppError::BadRequest("A prescription file is required".into()));
    }

    let prescription: PrescriptionEntity = diesel::insert_into(prescriptions::table)
        .values(CreatePrescriptionEntity {
            patient_id,
            uploaded_file,
        })
        .returning(PrescriptionEntity::as_returning())
        .get_result(conn)
        .await?;

    let extracted = match ocr::extract_text(client, urls, &prescription.uploaded_file).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                "OCR failed for prescription #{}: {:#}",
                prescription.id,
                err
            );
            let outcome = VerificationOutcome::OcrFailed {
                reason: err.to_string(),
            };
            return Ok((prescription, outcome));
        }
    };

    let required = required_medicine_names(conn, patient_id).await?;
    let outcome =
        VerificationOutcome::from_extracted_text(&extracted, required.iter().map(String::as_str));

    let prescription = diesel::update(prescriptions::table.find(prescription.id))
        .set((
            prescriptions::notes.eq(&extracted),
            prescriptions::verified.eq(outcome.is_verified()),
        ))
        .returning(PrescriptionEntity::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(
        "Prescription #{} uploaded by patient #{}: {:?}",
        prescription.id,
        patient_id,
        outcome
    );

    Ok((prescription, outcome))
}

pub async fn list(
    conn: &mut AsyncPgConnection,
    actor: Actor,
) -> Result<Vec<PrescriptionEntity>, AppError> {
    let prescriptions = match actor.role {
        Role::Patient => {
            prescriptions::table
                .filter(prescriptions::patient_id.eq(actor.id))
                .order(prescriptions::uploaded_at.desc())
                .select(PrescriptionEntity::as_select())
                .load(conn)
                .await?
        }
        Role::Pharmacist => {
            prescriptions::table
                .inner_join(orders::table)
                .filter(orders::pharmacy_id.eq(actor.id))
                .order(prescriptions::uploaded_at.desc())
                .select(PrescriptionEntity::as_select())
                .distinct()
                .load(conn)
                .await?
        }
        Role::Admin => {
            prescriptions::table
                .order(prescriptions::uploaded_at.desc())
                .select(PrescriptionEntity::as_select())
                .load(conn)
                .await?
        }
        Role::Delivery => {
            return Err(AppError::ForbiddenResource(
                "Couriers cannot view prescriptions".into(),
            ));
        }
    };

    Ok(prescriptions)
}

pub async fn get(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    id: i32,
) -> Result<PrescriptionEntity, AppError> {
    let prescription: PrescriptionEntity = prescriptions::table
        .find(id)
        .select(PrescriptionEntity::as_select())
        .first(conn)
        .await?;

    match actor.role {
        Role::Patient if prescription.patient_id == actor.id => Ok(prescription),
        Role::Pharmacist | Role::Admin => Ok(prescription),
        Role::Patient | Role::Delivery => Err(AppError::ForbiddenResource(
            "You cannot view this prescription".into(),
        )),
    }
}

/// Trusted override by a pharmacist or admin, recorded against their identity.
pub async fn verify_manually(
    conn: &mut AsyncPgConnection,
    actor: Actor,
    id: i32,
) -> Result<PrescriptionEntity, AppError> {
    match actor.role {
        Role::Pharmacist | Role::Admin => {}
        Role::Patient | Role::Delivery => {
            return Err(AppError::ForbiddenResource(
                "Not authorized to verify prescriptions".into(),
            ));
        }
    }

    let prescription = diesel::update(prescriptions::table.find(id))
        .set((
            prescriptions::verified.eq(true),
            prescriptions::verified_by.eq(actor.id),
        ))
        .returning(PrescriptionEntity::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(
        "Prescription #{} verified manually by {} #{}",
        prescription.id,
        actor.role,
        actor.id
    );

    Ok(prescription)
}

/// Prescription Gate: the patient's most recent verified, unused prescription when
/// `needs_prescription`.
pub async fn select_for_checkout(
    conn: &mut AsyncPgConnection,
    patient_id: i32,
    needs_prescription: bool,
) -> QueryResult<GateDecision> {
    if !needs_prescription {
        return Ok(GateDecision::NotRequired);
    }

    let candidates: Vec<(i32, chrono::DateTime<chrono::Utc>, bool, bool)> = prescriptions::table
        .filter(prescriptions::patient_id.eq(patient_id))
        .filter(prescriptions::verified.eq(true).and(prescriptions::used.eq(false)))
        .select((
            prescriptions::id,
            prescriptions::uploaded_at,
            prescriptions::verified,
            prescriptions::used,
        ))
        .load(conn)
        .await?;

    Ok(evaluate_gate(
        true,
        candidates
            .into_iter()
            .map(|(id, uploaded_at, verified, used)| GateCandidate {
                id,
                uploaded_at,
                verified,
                used,
            }),
    ))
}

/// Re-reads a bound prescription under a row lock inside the checkout transaction.
/// Returns it only if it still belongs to the patient and is verified and unused.
pub async fn lock_for_checkout(
    conn: &mut AsyncPgConnection,
    id: i32,
    patient_id: i32,
) -> QueryResult<Option<PrescriptionEntity>> {
    let prescription: Option<PrescriptionEntity> = prescriptions::table
        .find(id)
        .select(PrescriptionEntity::as_select())
        .for_update()
        .first(conn)
        .await
        .optional()?;

    Ok(prescription.filter(|p| p.patient_id == patient_id && p.verified && !p.used))
}

/// Marks a locked prescription as consumed. Returns `false` if it was already used.
pub async fn consume(conn: &mut AsyncPgConnection, id: i32) -> QueryResult<bool> {
    let updated = diesel::update(
        prescriptions::table
            .find(id)
            .filter(prescriptions::used.eq(false)),
    )
    .set(prescriptions::used.eq(true))
    .execute(conn)
    .await?;

    Ok(updated == 1)
}
