//! Window ID grammar: `pty-{uuid-v4}` for direct PTYs, `mux-{session}:{index}` for
//! windows backed by an external multiplexer.

use std::fmt;
use uuid::Uuid;

/// Prefix prepended to every multiplexer session name this broker creates, so its
/// sessions never collide with a developer's own interactive `tmux` sessions.
pub const SESSION_NAMESPACE: &str = "mobile-";

/// A window identifier. Immutable once issued; never reused after a window dies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WindowId {
    Direct(Uuid),
    Multiplexed { session: String, index: u32 },
}

impl WindowId {
    pub fn new_direct() -> Self {
        WindowId::Direct(Uuid::new_v4())
    }

    pub fn new_multiplexed(session: impl Into<String>, index: u32) -> Self {
        WindowId::Multiplexed {
            session: session.into(),
            index,
        }
    }

    /// Derive a session name from a project path: take the final path component,
    /// replace characters outside `[A-Za-z0-9_-]` with `-`, truncate to 30 chars,
    /// and prefix with [`SESSION_NAMESPACE`].
    pub fn session_name_for(project_path: &str) -> String {
        let base = std::path::Path::new(project_path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "session".to_string());

        let sanitized: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .take(30)
            .collect();

        format!("{}{}", SESSION_NAMESPACE, sanitized)
    }

    /// Parse the wire-format string back into a `WindowId`.
    ///
    /// A `mux-` id missing its `:index` suffix is rejected rather than defaulted to
    /// window 0 — a client that forgot the suffix should see an error, not silently
    /// land on the wrong window.
    pub fn parse(s: &str) -> Result<Self, String> {
        if let Some(rest) = s.strip_prefix("pty-") {
            let uuid = Uuid::parse_str(rest).map_err(|e| format!("bad pty id: {e}"))?;
            return Ok(WindowId::Direct(uuid));
        }
        if let Some(rest) = s.strip_prefix("mux-") {
            let (session, index) = rest
                .rsplit_once(':')
                .ok_or_else(|| format!("missing ':index' suffix in mux id: {s}"))?;
            if session.is_empty() {
                return Err(format!("empty session name in mux id: {s}"));
            }
            let index: u32 = index
                .parse()
                .map_err(|_| format!("non-numeric index in mux id: {s}"))?;
            return Ok(WindowId::Multiplexed {
                session: session.to_string(),
                index,
            });
        }
        Err(format!("unrecognized window id: {s}"))
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowId::Direct(uuid) => write!(f, "pty-{uuid}"),
            WindowId::Multiplexed { session, index } => write!(f, "mux-{session}:{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_round_trips() {
        let id = WindowId::new_direct();
        let s = id.to_string();
        assert!(s.starts_with("pty-"));
        assert_eq!(WindowId::parse(&s).unwrap(), id);
    }

    #[test]
    fn multiplexed_round_trips() {
        let id = WindowId::new_multiplexed("mobile-myproj", 3);
        assert_eq!(id.to_string(), "mux-mobile-myproj:3");
        assert_eq!(WindowId::parse("mux-mobile-myproj:3").unwrap(), id);
    }

    #[test]
    fn legacy_id_without_index_is_rejected() {
        assert!(WindowId::parse("mux-myproj").is_err());
    }

    #[test]
    fn garbage_prefix_is_rejected() {
        assert!(WindowId::parse("win-123").is_err());
    }

    #[test]
    fn session_name_sanitizes_and_namespaces() {
        let name = WindowId::session_name_for("/home/dev/My Cool App!!");
        assert_eq!(name, "mobile-My-Cool-App--");
    }

    #[test]
    fn session_name_truncates_to_30_chars() {
        let long = "a".repeat(60);
        let name = WindowId::session_name_for(&long);
        assert_eq!(name.len(), SESSION_NAMESPACE.len() + 30);
    }
}
