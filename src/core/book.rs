// Book record model and the field rules enforced at the service boundary.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::key::BookKey;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(rename = "_id")]
    pub key: BookKey,
    pub title: String,
    pub author: String,
    pub year: u32,
}

/// Raw request body for create and update. Unknown fields are ignored.
///
/// `None` means the field was absent; an explicit `null` is kept as
/// `Some(Value::Null)` so the field rules reject it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BookInput {
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub author: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub year: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: u32,
}

/// Free-text field values exactly as entered in a form. Validation happens
/// on the service side; the client only checks for empty fields.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BookFields {
    pub title: String,
    pub author: String,
    pub year: String,
}

impl BookFields {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        year: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            year: year.into(),
        }
    }

    pub fn from_book(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            year: book.year.to_string(),
        }
    }

    pub fn has_empty_field(&self) -> bool {
        self.title.trim().is_empty()
            || self.author.trim().is_empty()
            || self.year.trim().is_empty()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<u32>,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        year: u32,
    ) -> Result<Self, Error> {
        Ok(Self {
            title: text_field("title", &Value::String(title.into()))?,
            author: text_field("author", &Value::String(author.into()))?,
            year: year_field(&Value::from(year))?,
        })
    }

    pub fn from_input(input: BookInput) -> Result<Self, Error> {
        let title = input.title.ok_or_else(|| missing_field("title"))?;
        let author = input.author.ok_or_else(|| missing_field("author"))?;
        let year = input.year.ok_or_else(|| missing_field("year"))?;
        Ok(Self {
            title: text_field("title", &title)?,
            author: text_field("author", &author)?,
            year: year_field(&year)?,
        })
    }

    pub fn into_book(self, key: BookKey) -> Book {
        Book {
            key,
            title: self.title,
            author: self.author,
            year: self.year,
        }
    }
}

impl BookPatch {
    pub fn from_input(input: BookInput) -> Result<Self, Error> {
        Ok(Self {
            title: input
                .title
                .as_ref()
                .map(|value| text_field("title", value))
                .transpose()?,
            author: input
                .author
                .as_ref()
                .map(|value| text_field("author", value))
                .transpose()?,
            year: input.year.as_ref().map(year_field).transpose()?,
        })
    }

    pub fn apply(&self, book: &mut Book) {
        if let Some(title) = &self.title {
            book.title = title.clone();
        }
        if let Some(author) = &self.author {
            book.author = author.clone();
        }
        if let Some(year) = self.year {
            book.year = year;
        }
    }
}

fn missing_field(field: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("missing required field `{field}`"))
        .with_hint("Provide title, author, and year.")
}

fn text_field(field: &str, value: &Value) -> Result<String, Error> {
    let Value::String(text) = value else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("field `{field}` must be a string")));
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("field `{field}` must not be empty")));
    }
    Ok(trimmed.to_string())
}

/// Accepts a JSON integer or a string of decimal digits; the result must be
/// a positive `u32`.
pub(crate) fn year_field(value: &Value) -> Result<u32, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message("field `year` must be a positive integer")
            .with_hint("Use a year like 1965.")
    };
    let year = match value {
        Value::Number(number) => number.as_u64().ok_or_else(invalid)?,
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(invalid());
            }
            trimmed.parse::<u64>().map_err(|_| invalid())?
        }
        _ => return Err(invalid()),
    };
    if year == 0 {
        return Err(invalid());
    }
    u32::try_from(year).map_err(|_| invalid())
}
