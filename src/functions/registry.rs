//! # Function Registry
//!
//! Holds the functions of a project by name and resolves request paths to
//! the function that serves them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axum::http::Method;

use super::errors::{FunctionError, FunctionResult};
use super::function::Function;
use super::route::Route;
use crate::observability::{log_event_with_fields, Event};

/// Prefixes under which a function is addressable by name
const DEFAULT_PATH_PREFIXES: [&str; 2] = ["/.netlify/functions/", "/.netlify/builders/"];

/// A function resolved for a request path
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub function: Arc<Function>,
    /// Declared route that matched; `None` for the default path
    pub route: Option<Route>,
}

/// Registry of project functions
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Functions by name
    functions: RwLock<HashMap<String, Arc<Function>>>,
}

impl FunctionRegistry {
    /// Create a new registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function
    pub fn register(&self, function: Function) -> FunctionResult<Arc<Function>> {
        if !function.has_valid_name() {
            return Err(FunctionError::InvalidName(function.name().to_string()));
        }

        let name = function.name().to_string();
        let function = Arc::new(function);

        {
            let mut functions = self
                .functions
                .write()
                .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
            if functions.contains_key(&name) {
                return Err(FunctionError::AlreadyExists(name));
            }
            functions.insert(name.clone(), Arc::clone(&function));
        }

        log_event_with_fields(Event::FunctionRegistered, &[("function", name.as_str())]);
        Ok(function)
    }

    /// Get function by name
    pub fn get(&self, name: &str) -> FunctionResult<Arc<Function>> {
        let functions = self
            .functions
            .read()
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
        functions
            .get(name)
            .cloned()
            .ok_or_else(|| FunctionError::NotFound(name.to_string()))
    }

    /// Unregister a function
    pub fn unregister(&self, name: &str) -> FunctionResult<Arc<Function>> {
        let removed = {
            let mut functions = self
                .functions
                .write()
                .map_err(|_| FunctionError::Internal("Lock poisoned".into()))?;
            functions
                .remove(name)
                .ok_or_else(|| FunctionError::NotFound(name.to_string()))?
        };

        log_event_with_fields(Event::FunctionRemoved, &[("function", name)]);
        Ok(removed)
    }

    /// List all functions, sorted by name
    pub fn list(&self) -> Vec<Arc<Function>> {
        let mut functions: Vec<Arc<Function>> = self
            .functions
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        functions.sort_by(|a, b| a.name().cmp(b.name()));
        functions
    }

    /// Get function count
    pub fn len(&self) -> usize {
        self.functions.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve the function serving `url_path`
    ///
    /// A default path (`/.netlify/functions/<name>/...`) addresses the
    /// function by name, unless that function declares its own routes.
    /// Any other path is matched against declared routes, functions taken
    /// in name order.
    pub fn function_for_url_path(&self, url_path: &str, method: &Method) -> Option<RouteMatch> {
        if let Some(name) = default_path_function_name(url_path) {
            let function = self.get(name).ok()?;
            if !function.routes().is_empty() {
                return None;
            }
            return Some(RouteMatch {
                function,
                route: None,
            });
        }

        self.list().into_iter().find_map(|function| {
            let route = function.match_url_path(url_path, method)?;
            Some(RouteMatch {
                function,
                route: Some(route),
            })
        })
    }

    /// Functions with a schedule, once their builds have settled
    pub async fn scheduled_functions(&self) -> Vec<Arc<Function>> {
        let mut scheduled = Vec::new();
        for function in self.list() {
            if function.is_scheduled().await {
                scheduled.push(function);
            }
        }
        scheduled
    }
}

fn default_path_function_name(url_path: &str) -> Option<&str> {
    DEFAULT_PATH_PREFIXES.iter().find_map(|prefix| {
        let rest = url_path.strip_prefix(prefix)?;
        let name = rest.split('/').next().unwrap_or_default();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    })
}
