//! MemTable test binary
