use super::charset::{Charset, Decoder};
use super::multipart::{Multipart, MultipartError, Part};
use crate::bounded::BoxError;
use crate::http::{Body, BodyError, Bytes, MimeType};

use std::fmt;
use std::future::poll_fn;
use std::mem;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures_core::Stream;
use indexmap::map::{Entry, IndexMap};

/// A text form value sent without a filename.
#[derive(Clone, Debug)]
pub struct StringField {
    name: String,
    value: String,
    content_type: MimeType,
}

impl StringField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn content_type(&self) -> &MimeType {
        &self.content_type
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

/// An uploaded file with textual content.
#[derive(Debug)]
pub struct TextFileField {
    name: String,
    filename: String,
    content_type: MimeType,
    content: TextStream,
}

impl TextFileField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &MimeType {
        &self.content_type
    }

    /// The decoded file contents as a stream of text chunks.
    pub fn stream(&mut self) -> &mut TextStream {
        &mut self.content
    }

    pub fn into_stream(self) -> TextStream {
        self.content
    }

    /// Read the whole file as text.
    pub async fn text(self) -> Result<String, BoxError> {
        self.content.collect().await
    }
}

/// An uploaded file with binary content.
///
/// Also used for binary values sent without a filename.
#[derive(Debug)]
pub struct BinaryFileField {
    name: String,
    filename: Option<String>,
    content_type: MimeType,
    content: Body,
}

impl BinaryFileField {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn content_type(&self) -> &MimeType {
        &self.content_type
    }

    /// The file contents as a byte stream.
    pub fn stream(&mut self) -> &mut Body {
        &mut self.content
    }

    pub fn into_stream(self) -> Body {
        self.content
    }

    /// Read the whole file into memory.
    pub async fn bytes(self) -> Result<Bytes, BodyError> {
        self.content.collect().await
    }
}

/// A named value extracted from a `multipart/form-data` body.
///
/// Files sharing a name are collected into the list variants,
/// in the order they arrived.
#[derive(Debug)]
pub enum FormField {
    String(StringField),
    TextFile(TextFileField),
    BinaryFile(BinaryFileField),
    TextFileList(Vec<TextFileField>),
    BinaryFileList(Vec<BinaryFileField>),
}

impl FormField {
    pub fn name(&self) -> &str {
        match self {
            FormField::String(field) => field.name(),
            FormField::TextFile(field) => field.name(),
            FormField::BinaryFile(field) => field.name(),
            FormField::TextFileList(list) => list.first().map_or("", TextFileField::name),
            FormField::BinaryFileList(list) => list.first().map_or("", BinaryFileField::name),
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FormField::TextFileList(_) | FormField::BinaryFileList(_))
    }

    pub fn as_string(&self) -> Option<&StringField> {
        match self {
            FormField::String(field) => Some(field),
            _ => None,
        }
    }

    /// Build a field from a parsed part.
    ///
    /// A part is text when its content type is textual and its bytes
    /// decode under the declared charset, or `default_charset` if none
    /// is declared. Text without a filename is buffered into a
    /// [`StringField`]; text files stay streams.
    pub(crate) fn from_part(
        part: Part,
        default_content_type: &MimeType,
        default_charset: Charset,
    ) -> FormField {
        let (disposition, content_type, data) = part.into_parts();
        let name = disposition.name().unwrap_or_default().to_owned();
        let filename = disposition.filename().map(str::to_owned);
        let content_type = content_type.unwrap_or_else(|| default_content_type.clone());

        let charset = Some(&content_type)
            .filter(|mime| mime.is_text())
            .and_then(|mime| Charset::for_mime(mime, default_charset).ok())
            .filter(|charset| charset.can_decode(&data));

        match (filename, charset) {
            (None, Some(charset)) => FormField::String(StringField {
                name,
                value: charset.decode(&data).unwrap_or_default(),
                content_type,
            }),
            (Some(filename), Some(charset)) => FormField::TextFile(TextFileField {
                name,
                filename,
                content_type,
                content: TextStream::new(Body::once(data), charset),
            }),
            (filename, None) => FormField::BinaryFile(BinaryFileField {
                name,
                filename,
                content_type,
                content: Body::once(data),
            }),
        }
    }
}

/// The fields of a decoded `multipart/form-data` body, in arrival order.
#[derive(Debug, Default)]
pub struct FormData {
    fields: IndexMap<String, FormField>,
}

impl FormData {
    /// Read every part of a multipart body into a form.
    pub async fn parse(
        boundary: &str,
        body: Body,
        default_content_type: &MimeType,
        default_charset: Charset,
    ) -> Result<FormData, MultipartError> {
        let mut multipart = Multipart::new(boundary, body);
        let mut form = FormData::default();

        while let Some(part) = multipart.next_part().await? {
            form.insert(FormField::from_part(part, default_content_type, default_charset));
        }

        Ok(form)
    }

    /// Insert a field, merging it with an existing field of the same name.
    ///
    /// A text file joining a text file (or list of them) extends the list,
    /// and likewise for binary files. Any other collision replaces the
    /// existing entry, so a repeated string value keeps only the last one.
    pub fn insert(&mut self, field: FormField) {
        let slot = match self.fields.entry(field.name().to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(field);
                return;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        let existing = mem::replace(slot, FormField::TextFileList(Vec::new()));

        *slot = match (existing, field) {
            (FormField::TextFile(first), FormField::TextFile(next)) => {
                FormField::TextFileList(vec![first, next])
            }
            (FormField::TextFileList(mut list), FormField::TextFile(next)) => {
                list.push(next);
                FormField::TextFileList(list)
            }
            (FormField::BinaryFile(first), FormField::BinaryFile(next)) => {
                FormField::BinaryFileList(vec![first, next])
            }
            (FormField::BinaryFileList(mut list), FormField::BinaryFile(next)) => {
                list.push(next);
                FormField::BinaryFileList(list)
            }
            (existing, replacement) => {
                tracing::debug!(
                    name = replacement.name(),
                    list = existing.is_list(),
                    "form field replaced by a later part with the same name"
                );
                replacement
            }
        };
    }

    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.get(name)
    }

    /// Take ownership of a field, for example to consume a file stream.
    pub fn remove(&mut self, name: &str) -> Option<FormField> {
        self.fields.shift_remove(name)
    }

    /// The value of a [`StringField`].
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(FormField::as_string)
            .map(StringField::value)
    }

    /// The string fields of the form as `name => value`.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .values()
            .filter_map(FormField::as_string)
            .map(|field| (field.name(), field.value()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl IntoIterator for FormData {
    type Item = (String, FormField);
    type IntoIter = indexmap::map::IntoIter<String, FormField>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

pin_project_lite::pin_project! {
    /// A byte stream decoded into text chunks.
    ///
    /// Dropping the stream releases the underlying body.
    pub struct TextStream {
        #[pin]
        body: Body,
        decoder: Decoder,
        done: bool,
    }
}

impl TextStream {
    pub fn new(body: Body, charset: Charset) -> TextStream {
        TextStream {
            body,
            decoder: Decoder::new(charset),
            done: false,
        }
    }

    /// Read the remainder of the stream into a string.
    pub async fn collect(mut self) -> Result<String, BoxError> {
        let mut text = String::new();

        while let Some(chunk) = poll_fn(|cx| Pin::new(&mut self).poll_next(cx)).await {
            text.push_str(&chunk?);
        }

        Ok(text)
    }
}

impl fmt::Debug for TextStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextStream")
            .field("decoder", &self.decoder)
            .field("done", &self.done)
            .finish()
    }
}

impl Stream for TextStream {
    type Item = Result<String, BoxError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            let result = match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => match this.decoder.push(&chunk) {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => return Poll::Ready(Some(Ok(text))),
                    Err(err) => Err(err.into()),
                },
                Some(Err(err)) => Err(err),
                None => match this.decoder.finish() {
                    Ok(()) => Ok(()),
                    Err(err) => Err(err.into()),
                },
            };

            *this.done = true;

            if let Err(err) = result {
                return Poll::Ready(Some(Err(err)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn form(body: &'static [u8]) -> FormData {
        let text = MimeType::parse("text/plain").unwrap();
        FormData::parse("b", Body::once(body), &text, Charset::Utf8)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn value_field() {
        let form = form(b"--b\r\nContent-Disposition: form-data; name=\"q\"\r\n\r\nrust\r\n--b--").await;
        assert_eq!(form.value("q"), Some("rust"));
        assert_eq!(
            form.get("q").unwrap().as_string().unwrap().content_type().essence(),
            "text/plain"
        );
    }

    #[tokio::test]
    async fn binary_without_filename() {
        let mut form = form(
            b"--b\r\nContent-Disposition: form-data; name=\"blob\"\r\n\
              Content-Type: application/octet-stream\r\n\r\n\x01\x02\r\n--b--",
        )
        .await;

        match form.remove("blob") {
            Some(FormField::BinaryFile(field)) => {
                assert_eq!(field.filename(), None);
                assert_eq!(field.bytes().await.unwrap(), &b"\x01\x02"[..]);
            }
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_text_is_binary() {
        let form = form(
            b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\
              Content-Type: text/plain; charset=us-ascii\r\n\r\ncaf\xc3\xa9\r\n--b--",
        )
        .await;

        assert!(matches!(form.get("f"), Some(FormField::BinaryFile(_))));
    }

    #[tokio::test]
    async fn mixed_kinds_replace() {
        let form = form(
            b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.txt\"\r\n\r\ntext\r\n\
              --b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"a.bin\"\r\n\
              Content-Type: image/png\r\n\r\n\x89PNG\r\n--b--",
        )
        .await;

        assert_eq!(form.len(), 1);
        match form.get("f").unwrap() {
            FormField::BinaryFile(field) => assert_eq!(field.filename(), Some("a.bin")),
            other => panic!("unexpected field {:?}", other),
        }
    }

    #[tokio::test]
    async fn text_stream_chunks() {
        struct Chunks(Vec<Bytes>);

        impl Stream for Chunks {
            type Item = Result<Bytes, std::io::Error>;

            fn poll_next(mut self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Option<Self::Item>> {
                if self.0.is_empty() {
                    Poll::Ready(None)
                } else {
                    Poll::Ready(Some(Ok(self.0.remove(0))))
                }
            }
        }

        let bytes = "日本".as_bytes();
        let body = Body::stream(Chunks(vec![
            Bytes::copy_from_slice(&bytes[..1]),
            Bytes::copy_from_slice(&bytes[1..4]),
            Bytes::copy_from_slice(&bytes[4..]),
        ]));

        let stream = TextStream::new(body, Charset::Utf8);
        assert_eq!(stream.collect().await.unwrap(), "日本");

        let body = Body::stream(Chunks(vec![Bytes::copy_from_slice(&bytes[..2])]));
        assert!(TextStream::new(body, Charset::Utf8).collect().await.is_err());
    }
}
