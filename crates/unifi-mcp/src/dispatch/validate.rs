//! Startup check that the controller surface covers every tool.

use crate::client::{ControllerOperations, Signature, TypeRegistry};
use crate::registry::ToolRegistry;

/// Fatal mismatch between the tool catalog and the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    #[error("client is required")]
    ClientRequired,
    #[error("missing client method: {method} (for tool {tool})")]
    MissingOperation { method: String, tool: String },
    #[error("method {method} has {actual} parameters, expected {expected} (for tool {tool})")]
    ParameterCount {
        method: String,
        actual: usize,
        expected: usize,
        tool: String,
    },
    #[error("method {method} has {actual} return values, expected {expected} (for tool {tool})")]
    ReturnCount {
        method: String,
        actual: usize,
        expected: usize,
        tool: String,
    },
    #[error("missing type in registry for resource {resource} (for tool {tool})")]
    MissingTypeConstructor { resource: String, tool: String },
}

/// Walk every tool in order and stop at the first problem.
pub fn validate_all<C: ControllerOperations>(
    client: Option<&C>,
    tools: &ToolRegistry,
    types: &TypeRegistry,
) -> Result<(), StartupError> {
    let client = client.ok_or(StartupError::ClientRequired)?;

    for tool in tools.all() {
        if tool.category.has_payload() && !types.contains(&tool.resource) {
            return Err(StartupError::MissingTypeConstructor {
                resource: tool.resource.clone(),
                tool: tool.name.clone(),
            });
        }

        let method = tool.operation_name();
        let operation = client
            .operation(&method)
            .ok_or_else(|| StartupError::MissingOperation {
                method: method.clone(),
                tool: tool.name.clone(),
            })?;

        let actual = operation.signature();
        let expected = Signature::expected(tool.category, tool.is_setting);
        if actual.params != expected.params {
            return Err(StartupError::ParameterCount {
                method,
                actual: actual.params,
                expected: expected.params,
                tool: tool.name.clone(),
            });
        }
        if actual.returns != expected.returns {
            return Err(StartupError::ReturnCount {
                method,
                actual: actual.returns,
                expected: expected.returns,
                tool: tool.name.clone(),
            });
        }
    }

    log::debug!("Validated {} tools against the controller", tools.len());
    Ok(())
}
