/// Span/event attribute keys.
/// Keep these stable; changing them is a breaking change for dashboards.

// Resource
pub const KEY_SERVICE_NAME: &str = "service.name";
pub const KEY_SERVICE_VERSION: &str = "service.version";
pub const KEY_DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
pub const KEY_TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
pub const KEY_TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";

// Gen-AI semantic conventions
pub const GEN_AI_SYSTEM: &str = "gen_ai.system";
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";
pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";
pub const GEN_AI_RESPONSE_MODEL: &str = "gen_ai.response.model";
pub const GEN_AI_RESPONSE_FINISH_REASONS: &str = "gen_ai.response.finish_reasons";
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";
pub const GEN_AI_USAGE_TOTAL_TOKENS: &str = "gen_ai.usage.total_tokens";
pub const GEN_AI_EVENT_CONTENT: &str = "gen_ai.event.content";

/// System id stamped on every gen-ai event.
pub const GEN_AI_SYSTEM_VALUE: &str = "az.ai.inference";

// Event names
pub const EVENT_USER_MESSAGE: &str = "gen_ai.user.message";
pub const EVENT_SYSTEM_MESSAGE: &str = "gen_ai.system.message";
pub const EVENT_ASSISTANT_MESSAGE: &str = "gen_ai.assistant.message";
pub const EVENT_TOOL_MESSAGE: &str = "gen_ai.tool.message";
pub const EVENT_CHOICE: &str = "choice";
pub const EVENT_EXCEPTION: &str = "exception";

// Error-related
pub const KEY_ERROR: &str = "error";
pub const KEY_ERROR_TYPE: &str = "error.type";
pub const KEY_ERROR_MESSAGE: &str = "error.message";
pub const KEY_EXCEPTION_TYPE: &str = "exception.type";
pub const KEY_EXCEPTION_MESSAGE: &str = "exception.message";
