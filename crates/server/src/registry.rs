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

use crate::request::Request;
use crate::response::Response;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Whatever a handler wants to fail with. Its display text becomes the `error` of the reply.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A handler hands its `Response` back when it's done with it.
pub type HandlerResult = Result<Response, HandlerError>;

/// A remote method implementation.
///
/// Any `Fn(Request, Response) -> impl Future<Output = HandlerResult>` is a handler, so plain
/// `async fn`s can be registered directly.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, response: Response) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request, response: Response) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(request, response))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("method {0:?} is already registered")]
    AlreadyRegistered(String),
}

/// Method name to handler. Lookups don't lock, so methods can be added while the server is
/// already dispatching.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: papaya::HashMap<String, Arc<dyn Handler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. The first registration of a name wins; later ones are rejected.
    pub fn register<H: Handler>(&self, name: &str, handler: H) -> Result<(), RegistryError> {
        let handlers = self.handlers.pin();
        match handlers.try_insert(name.to_string(), Arc::new(handler)) {
            Ok(_) => Ok(()),
            Err(_) => Err(RegistryError::AlreadyRegistered(name.to_string())),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.pin().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.pin().contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.pin().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use porthos_common::StatusCode;
    use pretty_assertions::assert_eq;

    async fn first(_request: Request, mut response: Response) -> HandlerResult {
        response.raw(StatusCode::OK, "1")?;
        Ok(response)
    }

    async fn second(_request: Request, mut response: Response) -> HandlerResult {
        response.raw(StatusCode::OK, "2")?;
        Ok(response)
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let registry = MethodRegistry::new();
        registry.register("m", first).unwrap();
        assert_eq!(
            registry.register("m", second),
            Err(RegistryError::AlreadyRegistered("m".into()))
        );

        let handler = registry.lookup("m").unwrap();
        let response = handler
            .call(Request::new("m", "[]"), Response::new())
            .await
            .unwrap();
        assert_eq!(response.body().map(|b| b.as_ref()), Some(&b"1"[..]));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = MethodRegistry::new();
        registry.register("b", first).unwrap();
        registry
            .register("a", |_req: Request, res: Response| async move {
                Ok::<_, HandlerError>(res)
            })
            .unwrap();
        assert!(registry.lookup("c").is_none());
        assert!(registry.contains("a"));
        assert_eq!(registry.methods(), vec!["a".to_string(), "b".to_string()]);
    }
}
