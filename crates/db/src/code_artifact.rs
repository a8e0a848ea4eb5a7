//! Uploaded source code artifact.
//!
//! Each API resource has at most one current artifact. A new upload replaces
//! the existing row, and the superseded blob is removed from storage afterwards.

use std::path::Path;

use sea_orm::entity::prelude::*;

/// Allowed source file extensions.
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["py", "js", "go", "ts"];

/// Default max artifact size, in bytes.
pub const MAX_SIZE: usize = 10 * 1024 * 1024;

/// Code artifact model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "code_artifacts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub api_id: i64,
    pub filename: String,
    pub size_bytes: i64,
    pub language_hint: String,
    pub content_hash: Vec<u8>,
    pub content_key: String,
    pub uploaded_at: TimeDateTime,
}

/// Code artifact model relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::api_resource::Entity",
        from = "Column::ApiId",
        to = "super::api_resource::Column::Id"
    )]
    ApiResource,
}

impl Related<super::api_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiResource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Get the language hint for the provided file name.
///
/// Returns [`None`] if the file extension is not one of the [`ALLOWED_EXTENSIONS`].
/// Extensions are matched case-insensitively.
///
/// ## Example
///
/// ```
/// use db::code_artifact::language_hint;
///
/// assert_eq!(language_hint("sum.py"), Some("python"));
/// assert_eq!(language_hint("sum.rb"), None);
/// ```
pub fn language_hint(filename: &str) -> Option<&'static str> {
    let extension = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();

    match extension.as_str() {
        "py" => Some("python"),
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        "go" => Some("go"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{language_hint, ALLOWED_EXTENSIONS};

    #[test]
    fn allowed_extensions() {
        for extension in ALLOWED_EXTENSIONS {
            assert!(language_hint(&format!("main.{extension}")).is_some());
        }

        assert_eq!(language_hint("MAIN.TS"), Some("typescript"));
    }

    #[test]
    fn rejected_names() {
        assert_eq!(language_hint("main"), None);
        assert_eq!(language_hint("main.py.zip"), None);
        assert_eq!(language_hint(".py"), None);
        assert_eq!(language_hint("archive.tar"), None);
    }
}
