//! Internal utility helpers for ID lists, XML trees, JSON repair, and elapsed-time formatting.

pub(crate) mod ids;
pub(crate) mod json_repair;
pub(crate) mod time;
pub(crate) mod xml;
