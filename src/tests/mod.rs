mod helpers;
mod resolution;
