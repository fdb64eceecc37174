use std::fmt;

use crate::catalog::LayerInfo;
use crate::constraint::{Dimension, Operator, ValidatedConstraints};

/// File types ERDDAP can render a griddap subset as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    NetCdf,
    Csv,
    Tsv,
    Json,
    Mat,
    HtmlTable,
}

impl ResponseFormat {
    /// Extension used both in the request path and the local file name.
    pub fn extension(&self) -> &'static str {
        match self {
            ResponseFormat::NetCdf => "nc",
            ResponseFormat::Csv => "csv",
            ResponseFormat::Tsv => "tsv",
            ResponseFormat::Json => "json",
            ResponseFormat::Mat => "mat",
            ResponseFormat::HtmlTable => "htmlTable",
        }
    }
}

/// A griddap subset request, rendered as
/// `<layer>.<ext>?<var>[(lo):step:(hi)]...,<var2>[...]`.
///
/// Clauses follow the fixed axis order time, depth, latitude, longitude,
/// limited to the axes the layer declares. Missing parts fall back to
/// index `0`, stride `1` and `last`.
#[derive(Debug, Clone)]
pub struct SubsetQuery<'a> {
    layer: &'a LayerInfo,
    constraints: &'a ValidatedConstraints,
    variables: Vec<&'a str>,
    format: ResponseFormat,
}

impl<'a> SubsetQuery<'a> {
    pub fn new(
        layer: &'a LayerInfo,
        constraints: &'a ValidatedConstraints,
        format: ResponseFormat,
    ) -> Self {
        Self {
            layer,
            constraints,
            variables: layer.variables.iter().map(String::as_str).collect(),
            format,
        }
    }

    /// Restricts the request to these variables (in the order given).
    pub fn with_variables(mut self, variables: Vec<&'a str>) -> Self {
        self.variables = variables;
        self
    }

    /// Axes that will appear in every clause, in emission order.
    pub fn dimensions(&self) -> Vec<Dimension> {
        Dimension::ALL
            .into_iter()
            .filter(|d| self.layer.has_dimension(*d))
            .collect()
    }

    /// The `[..][..]` chain shared by every variable.
    pub fn subset_expression(&self) -> String {
        let mut out = String::new();
        for dim in self.dimensions() {
            let c = self.constraints;
            let start = c
                .get(dim, Operator::Lower)
                .map(|v| format!("({})", v))
                .unwrap_or_else(|| "0".to_string());
            let stride = c
                .get(dim, Operator::Step)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "1".to_string());
            let stop = c
                .get(dim, Operator::Upper)
                .map(|v| format!("({})", v))
                .unwrap_or_else(|| "last".to_string());
            out.push_str(&format!("[{}:{}:{}]", start, stride, stop));
        }
        out
    }
}

impl fmt::Display for SubsetQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}?", self.layer.id, self.format.extension())?;
        let expr = self.subset_expression();
        for (i, var) in self.variables.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}{}", var, expr)?;
        }
        Ok(())
    }
}
