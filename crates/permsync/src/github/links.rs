//! `Link` header parsing.
//!
//! GitHub paginates with headers shaped like
//! `<https://api.github.com/user/repos?page=2>; rel="next", <...?page=5>; rel="last"`.

/// Page numbers advertised by a `Link` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkPagination {
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
}

impl LinkPagination {
    pub fn has_next_page(&self) -> bool {
        self.next_page.is_some()
    }
}

pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let mut target = None;
        let mut rel = None;

        for segment in part.split(';').map(str::trim) {
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                target = Some(inner);
            } else if let Some(value) = segment.strip_prefix("rel=") {
                rel = Some(value.trim_matches('"'));
            }
        }

        let (Some(target), Some(rel)) = (target, rel) else {
            continue;
        };
        let Some(page) = page_param(target) else {
            continue;
        };
        match rel {
            "next" => info.next_page = Some(page),
            "last" => info.last_page = Some(page),
            _ => {}
        }
    }

    info
}

fn page_param(target: &str) -> Option<u32> {
    let parsed = url::Url::parse(target).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}
