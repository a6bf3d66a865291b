// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: Apache-2.0
//! Literal message markers shared by the driver, the tool controller, and the
//! UI.  These strings are part of the observable contract: the model sees
//! them verbatim and the UI matches on them, so they must never change
//! silently.

/// Assistant text yielded when the user cancels a request between tool uses.
pub const INTERRUPT_MESSAGE: &str = "[Request interrupted by user]";

/// Assistant text yielded when the user cancels a request while tools run.
pub const INTERRUPT_MESSAGE_FOR_TOOL_USE: &str = "[Request interrupted by user for tool use]";

/// Tool-result body emitted for every unterminated tool use on cancellation.
pub const CANCEL_MESSAGE: &str = "The user doesn't want to proceed with this tool use. \
The tool use was rejected (eg. if it was a file edit, the new_string was NOT written to the \
file). STOP what you are doing and wait for the user to tell you how to proceed.";

/// Tool-result body emitted when the user rejects a permission request.
pub const REJECT_MESSAGE: &str = "The user doesn't want to take this action right now. \
STOP what you are doing and wait for the user to tell you what to do next.";

/// Assistant text used when a local command produced no output to show.
pub const NO_RESPONSE_REQUESTED: &str = "No response requested.";

/// Sentinel substituted for content that reduces to the empty string; the
/// API rejects empty blocks, so they are never forwarded as-is.
pub const NO_CONTENT_MESSAGE: &str = "(no content)";
