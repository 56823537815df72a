// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::form::{Form, FormError};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use porthos_broker::Delivery;
use porthos_common::{HeaderValue, Headers};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// One inbound call, as handed to a method handler.
#[derive(Debug)]
pub struct Request {
    method: String,
    correlation_id: Option<String>,
    reply_to: Option<String>,
    expiration: Option<String>,
    headers: Headers,
    body: Bytes,
    form: OnceCell<Result<Form, FormError>>,
}

impl Request {
    /// A request for `method` with the given JSON body and no reply metadata. Mostly useful for
    /// exercising handlers directly.
    pub fn new(method: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: method.into(),
            correlation_id: None,
            reply_to: None,
            expiration: None,
            headers: Headers::new(),
            body: body.into(),
            form: OnceCell::new(),
        }
    }

    pub(crate) fn from_delivery(method: String, delivery: &Delivery) -> Self {
        let properties = &delivery.properties;
        Self {
            method,
            correlation_id: properties.correlation_id.clone(),
            reply_to: properties.reply_to.clone(),
            expiration: properties.expiration.clone(),
            headers: properties.headers.clone(),
            body: delivery.body.clone(),
            form: OnceCell::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Where the reply to this request goes.
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// The time-to-live the caller put on the request, as sent. This bounded how long the
    /// request could wait in the queue; it is not a deadline for the handler.
    pub fn expiration(&self) -> Option<&str> {
        self.expiration.as_deref()
    }

    /// `expiration` parsed as milliseconds, when it is well formed.
    pub fn expiration_hint(&self) -> Option<Duration> {
        self.expiration
            .as_deref()
            .and_then(|e| e.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The positional arguments. The body is decoded on first use; a malformed body gives the
    /// same error on every call.
    pub fn form(&self) -> Result<&Form, FormError> {
        self.form
            .get_or_init(|| Form::parse(&self.body))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Decode the whole argument array at once, typically into a tuple.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, FormError> {
        let form = self.form()?;
        serde_json::from_value(Value::Array(form.values().to_vec())).map_err(|e| {
            FormError::Decode {
                index: None,
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_form_is_parsed_once() {
        let request = Request::new("sum", "[1, 2]");
        let first = request.form().unwrap() as *const Form;
        let second = request.form().unwrap() as *const Form;
        assert_eq!(first, second);
        assert_eq!(request.form().unwrap().len(), 2);
    }

    #[test]
    fn test_malformed_body_is_sticky() {
        let request = Request::new("sum", "{not json");
        assert!(matches!(request.form(), Err(FormError::MalformedBody(_))));
        assert!(matches!(request.form(), Err(FormError::MalformedBody(_))));
        assert!(matches!(
            request.args::<(f64,)>(),
            Err(FormError::MalformedBody(_))
        ));
    }

    #[test]
    fn test_args_as_tuple() {
        let request = Request::new("greet", r#"["bob", 3]"#);
        assert_eq!(request.args::<(String, u32)>(), Ok(("bob".to_string(), 3)));
        assert!(matches!(
            request.args::<(String, String)>(),
            Err(FormError::Decode { index: None, .. })
        ));
    }

    #[test]
    fn test_metadata() {
        let request = Request::new("sum", "[]")
            .with_correlation_id("42")
            .with_reply_to("amq.gen-reply")
            .with_header("X-Trace", "abc");
        assert_eq!(request.method(), "sum");
        assert_eq!(request.correlation_id(), Some("42"));
        assert_eq!(request.reply_to(), Some("amq.gen-reply"));
        assert_eq!(
            request.header("X-Trace").and_then(HeaderValue::as_str),
            Some("abc")
        );
        assert_eq!(request.expiration_hint(), None);
    }
}
