//! # Route Matching
//!
//! A function may declare the URL paths it serves, either as literal paths
//! or as regular expressions, optionally restricted to HTTP methods. A
//! second list of exclusions can carve paths back out of a matching route.

use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{FunctionError, FunctionResult};
use crate::observability::{log_event_with_fields, Event};

/// A declared route
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Exact path to match after normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    /// Regular expression tested against the normalized path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Accepted methods; empty accepts all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

impl Route {
    /// Create a literal route
    pub fn literal(path: impl Into<String>) -> Self {
        Self {
            literal: Some(path.into()),
            ..Default::default()
        }
    }

    /// Create an expression route
    pub fn expression(pattern: impl Into<String>) -> Self {
        Self {
            expression: Some(pattern.into()),
            ..Default::default()
        }
    }

    /// Restrict the route to the given methods
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `method` passes the route's method restriction
    pub fn accepts_method(&self, method: &Method) -> bool {
        self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Check that the expression, if any, compiles
    pub fn validate(&self) -> FunctionResult<()> {
        if self.literal.is_none() {
            if let Some(expression) = &self.expression {
                Regex::new(expression).map_err(|e| FunctionError::InvalidRoute {
                    expression: expression.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

/// Strip one trailing slash (except for the root) and lowercase
pub fn normalize_path(raw_path: &str) -> String {
    let trimmed = match raw_path.strip_suffix('/') {
        Some(rest) if raw_path != "/" => rest,
        _ => raw_path,
    };
    trimmed.to_lowercase()
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    route: Route,
    pattern: Option<Regex>,
}

impl CompiledRoute {
    fn compile(route: Route) -> Self {
        let pattern = match (&route.literal, &route.expression) {
            (None, Some(expression)) => match Regex::new(expression) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    log_event_with_fields(
                        Event::RouteExpressionInvalid,
                        &[("expression", expression.as_str()), ("reason", e.to_string().as_str())],
                    );
                    None
                }
            },
            _ => None,
        };
        Self { route, pattern }
    }

    /// Literal takes precedence over expression when both are set
    fn matches_path(&self, path: &str) -> bool {
        if let Some(literal) = &self.route.literal {
            return literal == path;
        }
        match &self.pattern {
            Some(regex) => regex.is_match(path),
            None => false,
        }
    }
}

/// Routes and exclusions with expressions compiled once
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    excluded: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile a route table; invalid expressions never match
    pub fn new(routes: Vec<Route>, excluded_routes: Vec<Route>) -> Self {
        Self {
            routes: routes.into_iter().map(CompiledRoute::compile).collect(),
            excluded: excluded_routes
                .into_iter()
                .map(CompiledRoute::compile)
                .collect(),
        }
    }

    /// Declared routes, in order
    pub fn routes(&self) -> Vec<Route> {
        self.routes.iter().map(|c| c.route.clone()).collect()
    }

    /// Declared exclusions, in order
    pub fn excluded_routes(&self) -> Vec<Route> {
        self.excluded.iter().map(|c| c.route.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching the request, unless an exclusion
    /// covers the path
    pub fn match_url_path(&self, raw_path: &str, method: &Method) -> Option<&Route> {
        let path = normalize_path(raw_path);

        let matched = self
            .routes
            .iter()
            .find(|c| c.route.accepts_method(method) && c.matches_path(&path))?;

        // Exclusions ignore method restrictions
        if self.excluded.iter().any(|c| c.matches_path(&path)) {
            return None;
        }

        Some(&matched.route)
    }
}
