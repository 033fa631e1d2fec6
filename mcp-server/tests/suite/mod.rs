mod initialize;
mod interrupt;
mod resources;
mod sampling;
mod stdio_framing;
