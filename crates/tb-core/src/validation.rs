//! Field-length checks shared by every store implementation.
//!
//! Lengths count Unicode scalar values, not bytes.

use crate::error::{AppError, Result};
use crate::models::NewPost;

pub const TITLE_MAX: usize = 64;
pub const NAME_MAX: usize = 32;
pub const CONTACT_MAX: usize = 128;

fn required(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len == 0 {
        return Err(AppError::validation(field, "is required"));
    }
    if len > max {
        return Err(AppError::validation(
            field,
            format!("must be at most {max} characters (got {len})"),
        ));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    required("title", title, TITLE_MAX)
}

pub fn validate_post(post: &NewPost) -> Result<()> {
    required("name", &post.name, NAME_MAX)?;
    let contact_len = post.contact.chars().count();
    if contact_len > CONTACT_MAX {
        return Err(AppError::validation(
            "contact",
            format!("must be at most {CONTACT_MAX} characters (got {contact_len})"),
        ));
    }
    Ok(())
}
