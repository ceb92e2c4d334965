//! Mapping values for element inputs and outputs.
//!
//! Every mapping value is a minijinja expression evaluated against the
//! variables visible from the element's scope. The result keeps its type, so
//! `"count + 1"` yields a number and `"{'id': order_id}"` yields an object.
//!
//! # Examples
//!
//! ```json
//! {
//!   "inputs": { "localScope": "true", "total": "price * quantity" },
//!   "outputs": { "approved": "result.approved" }
//! }
//! ```
//!
//! Message correlation keys are the one exception: they are templates
//! (`"{{ order_id }}"`) rendered to a string when the subscription opens.

/// A mapping value is an expression string resolved at runtime.
pub type InputValue = String;
