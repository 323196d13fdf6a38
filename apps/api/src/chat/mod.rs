// The extraction-and-mapping pipeline and its persistence boundary.
// One incoming user message triggers one pass: reply, extract, search,
// map, persist — all within the request.

pub mod handlers;
pub mod pipeline;
pub mod store;
