use hyper::Method;
use sandbox_storage::envelope::Rights;

/// Operation selected from method and path, before any token is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    Head,
    Preflight,
    Landing,
    Create,
    Read {
        location: &'a str,
    },
    Update {
        location: &'a str,
        token: &'a str,
    },
    /// Delete authorized by whichever rights field the path names.
    Delete {
        location: &'a str,
        token: &'a str,
        rights: Rights,
    },
    NotFound,
}

impl<'a> Action<'a> {
    pub fn parse(method: &Method, path: &'a str) -> Self {
        if method == Method::HEAD {
            return Self::Head;
        }
        if method == Method::OPTIONS {
            return Self::Preflight;
        }

        if path == "/" {
            return if method == Method::GET {
                Self::Landing
            } else {
                Self::NotFound
            };
        }
        if path == "/store" {
            return if method == Method::POST {
                Self::Create
            } else {
                Self::NotFound
            };
        }
        if let Some(rest) = path.strip_prefix("/p3/") {
            return if method == Method::GET {
                Self::Read {
                    location: segment(rest, 0),
                }
            } else {
                Self::NotFound
            };
        }
        if let Some(rest) = path.strip_prefix("/update/") {
            let location = segment(rest, 0);
            let token = segment(rest, 1);
            return match *method {
                Method::PUT => Self::Update { location, token },
                Method::DELETE => Self::Delete {
                    location,
                    token,
                    rights: Rights::Update,
                },
                _ => Self::NotFound,
            };
        }
        if let Some(rest) = path.strip_prefix("/delete/") {
            return if method == Method::DELETE {
                Self::Delete {
                    location: segment(rest, 0),
                    token: segment(rest, 1),
                    rights: Rights::Delete,
                }
            } else {
                Self::NotFound
            };
        }
        Self::NotFound
    }

    /// Label for logs; never includes tokens.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::Preflight => "preflight",
            Self::Landing => "landing",
            Self::Create => "create",
            Self::Read { .. } => "read",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::NotFound => "not_found",
        }
    }
}

fn segment(rest: &str, index: usize) -> &str {
    rest.split('/').nth(index).unwrap_or("")
}
