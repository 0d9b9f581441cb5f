use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::AppError;
use crate::media::ImageUpload;
use crate::models::{NewVisit, Visit};
use crate::AppState;

#[derive(Serialize)]
struct InsertResponse {
    ok: bool,
    cloudinary: serde_json::Value,
    data: Visit,
}

struct Photo {
    content_type: Option<String>,
    bytes: Bytes,
}

/// Raw multipart fields, before validation.
#[derive(Default)]
struct VisitForm {
    name: Option<String>,
    comment: Option<String>,
    photo: Option<Photo>,
}

/// A form that passed validation and may be sent to the media host.
struct VisitUpload {
    name: String,
    comment: Option<String>,
    image: ImageUpload,
}

impl VisitForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = VisitForm::default();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().map(str::to_owned);
            match field_name.as_deref() {
                Some("name") => form.name = Some(field.text().await?),
                Some("comment") => form.comment = Some(field.text().await?),
                Some("photo") => {
                    let content_type = field.content_type().map(str::to_owned);
                    let bytes = field.bytes().await?;
                    form.photo = Some(Photo {
                        content_type,
                        bytes,
                    });
                }
                // The media host assigns public ids.
                Some("public_id") => tracing::debug!("Ignoring caller-supplied public_id"),
                _ => {}
            }
        }

        Ok(form)
    }

    fn validate(self) -> Result<VisitUpload, AppError> {
        let photo = self
            .photo
            .filter(|p| !p.bytes.is_empty())
            .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

        let content_type = match photo.content_type {
            Some(ct) if ct.starts_with("image/") => ct,
            Some(ct) => {
                return Err(AppError::BadRequest(format!(
                    "Invalid file type `{ct}`: expected an image/* upload"
                )));
            }
            None => {
                return Err(AppError::BadRequest(
                    "Missing file content type: expected an image/* upload".to_string(),
                ));
            }
        };

        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing required field: name".to_string()))?;

        Ok(VisitUpload {
            name,
            comment: self.comment,
            image: ImageUpload::new(content_type, photo.bytes),
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/insert_data", post(insert_visit))
        .route("/upload", post(insert_visit))
        .route("/get_data", get(list_visits))
}

async fn insert_visit(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<InsertResponse>, AppError> {
    let upload = VisitForm::read(multipart?).await?.validate()?;

    tracing::info!(
        name = %upload.name,
        content_type = %upload.image.content_type,
        bytes = upload.image.bytes.len(),
        "Uploading visit photo"
    );
    let uploaded = state.media.upload_image(&upload.image).await?;

    let new_visit = NewVisit::new(
        upload.name,
        upload.comment,
        uploaded.image_url,
        uploaded.public_id,
    );

    let visit = match state.db.insert_visit(&new_visit).await {
        Ok(visit) => visit,
        Err(e) => {
            // No compensation: the uploaded asset stays on the media host.
            tracing::warn!(
                public_id = %new_visit.public_id,
                "Visit insert failed after upload, remote asset is orphaned"
            );
            return Err(e.into());
        }
    };

    tracing::info!(id = visit.id, public_id = %visit.public_id, "Visit stored");

    Ok(Json(InsertResponse {
        ok: true,
        cloudinary: uploaded.raw,
        data: visit,
    }))
}

async fn list_visits(State(state): State<AppState>) -> Result<Json<Vec<Visit>>, AppError> {
    let visits = state.db.list_visits().await?;
    Ok(Json(visits))
}
