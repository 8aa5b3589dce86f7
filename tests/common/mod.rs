#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use actix_web::web;
use lostfound::auth::{create_jwt, Claims, JwtKeys};
use lostfound::models::ReportForm;
use lostfound::storage::{ImageStore, ImageStoreError};

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn keys() -> JwtKeys {
    JwtKeys::new(SECRET)
}

/// Signing keys as the server registers them.
pub fn jwt_keys() -> web::Data<JwtKeys> {
    web::Data::new(keys())
}

pub fn token(user: &str) -> String {
    create_jwt(&keys(), user, &format!("{user} name"), &format!("{user}@campus.edu")).unwrap()
}

pub fn claims(user: &str) -> Claims {
    Claims {
        sub: user.to_string(),
        exp: usize::MAX,
        name: format!("{user} name"),
        email: format!("{user}@campus.edu"),
    }
}

// ---------------- In-memory Mock ImageStore (tests only) ----------------
#[derive(Default)]
pub struct MockImageStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_saves: AtomicBool,
}

impl MockImageStore {
    pub fn failing() -> Self {
        let s = Self::default();
        s.fail_saves.store(true, Ordering::SeqCst);
        s
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.inner.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ImageStore for MockImageStore {
    async fn save(&self, name: &str, mime: &str, bytes: &[u8]) -> Result<(), ImageStoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ImageStoreError::Other("bucket unavailable".into()));
        }
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(name) {
            return Err(ImageStoreError::Duplicate);
        }
        map.insert(name.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, name: &str) -> Result<(Vec<u8>, String), ImageStoreError> {
        let map = self.inner.lock().unwrap();
        map.get(name).cloned().ok_or(ImageStoreError::NotFound)
    }
    async fn delete(&self, name: &str) -> Result<(), ImageStoreError> {
        let mut map = self.inner.lock().unwrap();
        map.remove(name);
        Ok(())
    }
}

// Minimal 1x1 PNG (transparent)
pub fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

pub fn sample_pdf() -> Vec<u8> {
    b"%PDF-1.4\n1 0 obj\n<<\n/Type /Catalog\n>>\nendobj\n%%EOF".to_vec()
}

pub fn wallet_report() -> ReportForm {
    ReportForm {
        kind: Some("lost".into()),
        title: Some("Blue wallet".into()),
        description: Some("Leather, has student ID inside".into()),
        category: Some("Wallet".into()),
        location: Some("Library 2F".into()),
        date: Some("2024-03-01".into()),
        contact_name: Some("Ana".into()),
        contact_email: Some("Ana@Campus.edu".into()),
        phone: None,
    }
}

/// Multipart body: the report's text fields followed by `images` parts.
pub fn report_multipart(form: &ReportForm, images: &[(&str, Vec<u8>)], boundary: &str) -> (String, Vec<u8>) {
    let mut body: Vec<u8> = Vec::new();
    let fields = [
        ("type", &form.kind),
        ("title", &form.title),
        ("description", &form.description),
        ("category", &form.category),
        ("location", &form.location),
        ("date", &form.date),
        ("contactName", &form.contact_name),
        ("contactEmail", &form.contact_email),
        ("phone", &form.phone),
    ];
    for (name, value) in fields {
        if let Some(v) = value {
            body.extend_from_slice(
                format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{v}\r\n").as_bytes(),
            );
        }
    }
    for (file_name, bytes) in images {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}
