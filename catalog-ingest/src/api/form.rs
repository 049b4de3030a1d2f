//! Multipart decoding
//!
//! Parts with a file name become attachments; every other part is a scalar
//! field. Part order is kept since later attachments replace earlier ones.

use axum::extract::multipart::{Field, Multipart, MultipartError};

use crate::error::{ApiError, ApiResult};
use crate::pipeline::{Attachment, Submission};

/// Read a whole multipart body into a [`Submission`]
pub async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut submission = Submission::new();

    while let Some(field) = multipart.next_field().await.map_err(decode_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            // Browsers send an empty file part for an unfilled file input
            Some(file_name) if file_name.is_empty() => {
                tracing::debug!(field = %name, "Skipping empty file part");
            }
            Some(file_name) => {
                let attachment = read_attachment(field, name, file_name).await?;
                submission.attachments.push(attachment);
            }
            None => {
                let value = field.text().await.map_err(decode_error)?;
                submission = submission.with_field(name, value);
            }
        }
    }

    tracing::debug!(
        fields = submission.fields.len(),
        attachments = submission.attachments.len(),
        "Decoded multipart submission"
    );

    Ok(submission)
}

async fn read_attachment(
    field: Field<'_>,
    name: String,
    file_name: String,
) -> ApiResult<Attachment> {
    let content_type = field.content_type().map(str::to_string);
    let data = field.bytes().await.map_err(decode_error)?;

    Ok(Attachment::new(name, file_name, content_type.as_deref(), data))
}

fn decode_error(err: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
}
