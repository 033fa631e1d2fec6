// Aggregates all former standalone integration tests as modules.
mod content_blocks;
mod roundtrip;
