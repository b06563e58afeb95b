//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam (forum transport, session store, episode
//! tracker) plus HTML fixtures shaped like the pages the forum serves, so the
//! whole pipeline can be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use forumdex_core::testing::{fixtures, MockResponse, MockTransport};
//!
//! let transport = MockTransport::new("https://forum.example.org");
//! transport
//!     .script_get("/index.php", vec![MockResponse::ok(fixtures::index_logged_in("alice"))])
//!     .await;
//! ```

mod mock_session_store;
mod mock_tracker;
mod mock_transport;

pub use mock_session_store::MemorySessionStore;
pub use mock_tracker::MockEpisodeTracker;
pub use mock_transport::{MockResponse, MockTransport, RecordedRequest};

/// HTML fixtures modelled on a phpBB board.
pub mod fixtures {
    /// A release posted in a thread: the text around the link and the link itself.
    #[derive(Debug, Clone)]
    pub struct FixtureRelease {
        pub context: String,
        pub uri: String,
    }

    impl FixtureRelease {
        pub fn new(context: &str, uri: &str) -> Self {
            Self {
                context: context.to_string(),
                uri: uri.to_string(),
            }
        }
    }

    /// Magnet URI with optional display name and exact length.
    pub fn magnet(info_hash: &str, display_name: Option<&str>, length: Option<u64>) -> String {
        let mut uri = format!("magnet:?xt=urn:btih:{}", info_hash);
        if let Some(dn) = display_name {
            uri.push_str(&format!("&dn={}", urlencoding::encode(dn)));
        }
        if let Some(xl) = length {
            uri.push_str(&format!("&xl={}", xl));
        }
        uri.push_str("&tr=udp%3A%2F%2Ftracker.example.org%3A1337");
        uri
    }

    pub fn login_page() -> String {
        r#"<!DOCTYPE html>
<html><head><title>Login</title></head>
<body>
<div id="page-body">
  <form action="./ucp.php?mode=login" method="post" id="login" data-focus="username">
    <fieldset>
      <input type="text" tabindex="1" name="username" id="username" value="" />
      <input type="password" tabindex="2" id="password" name="password" autocomplete="off" />
      <input type="checkbox" name="autologin" id="autologin" checked="checked" />
      <input type="checkbox" name="viewonline" id="viewonline" />
      <input type="hidden" name="sid" value="0f1e2d3c4b5a" />
      <input type="hidden" name="creation_time" value="1700000000" />
      <input type="hidden" name="form_token" value="tok123" />
      <input type="hidden" name="redirect" value="./ucp.php?mode=login" />
      <input type="submit" name="login" tabindex="6" value="Login" class="button1" />
    </fieldset>
  </form>
</div>
</body></html>"#
            .to_string()
    }

    pub fn login_rejected_page() -> String {
        r#"<!DOCTYPE html>
<html><body>
<div class="error">You have specified an incorrect password. Please check your password and try again.</div>
<form action="./ucp.php?mode=login" method="post" id="login">
  <input type="text" name="username" value="alice" />
  <input type="password" name="password" />
  <input type="submit" name="login" value="Login" />
</form>
</body></html>"#
            .to_string()
    }

    pub fn index_logged_in(username: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html><body>
<div class="navbar">
  <ul class="nav-main">
    <li class="dropdown-container"><a href="./ucp.php?i=0" class="header-avatar"><span class="username">{username}</span></a></li>
    <li><a href="./ucp.php?mode=logout&amp;sid=0f1e2d3c4b5a" title="Logout">Logout [ {username} ]</a></li>
  </ul>
</div>
<div id="page-body"><p>Board index</p></div>
</body></html>"#
        )
    }

    pub fn index_logged_out() -> String {
        r#"<!DOCTYPE html>
<html><body>
<div class="navbar">
  <form method="post" action="./ucp.php?mode=login" class="headerspace" id="login">
    <input type="text" name="username" /><input type="password" name="password" />
    <input type="submit" name="login" value="Login" />
  </form>
</div>
<div id="page-body"><p>Board index</p></div>
</body></html>"#
            .to_string()
    }

    /// Search results listing with `(thread_id, title)` rows.
    pub fn search_results(threads: &[(&str, &str)]) -> String {
        let rows: String = threads
            .iter()
            .map(|(id, title)| {
                format!(
                    r#"
  <li class="row bg1">
    <dl class="row-item topic_read">
      <dt><div class="list-inner">
        <a href="./viewtopic.php?f=51&amp;t={id}&amp;sid=0f1e2d3c4b5a" class="topictitle">{title}</a>
        <br /><div class="responsive-hide left-box">by <a href="./memberlist.php?mode=viewprofile&amp;u=2" class="username">uploader</a></div>
      </div></dt>
      <dd class="posts">3</dd>
    </dl>
  </li>"#
                )
            })
            .collect();
        format!(
            r#"<!DOCTYPE html>
<html><body>
<h2 class="searchresults-title">Search found {} matches</h2>
<div class="forumbg"><div class="inner">
<ul class="topiclist topics">{}
</ul>
</div></div>
<a href="./ucp.php?mode=logout&amp;sid=0f1e2d3c4b5a">Logout</a>
</body></html>"#,
            threads.len(),
            rows
        )
    }

    pub fn search_no_results() -> String {
        r#"<!DOCTYPE html>
<html><body>
<div class="panel"><p>No suitable matches were found.</p></div>
</body></html>"#
            .to_string()
    }

    /// Thread page whose first post carries `releases`, optionally with a
    /// "thanks" button.
    pub fn thread_page(thread_id: &str, title: &str, releases: &[FixtureRelease], thanks: bool) -> String {
        let thanks_button = if thanks {
            format!(
                r#"<li><a id="lnk_thanks_post1{thread_id}" href="./app.php/thanks/1{thread_id}?to_id=2&amp;f=51&amp;p=1{thread_id}" class="button"><span>Thanks</span></a></li>"#
            )
        } else {
            String::new()
        };
        let blocks: String = releases
            .iter()
            .map(|r| {
                format!(
                    r#"
      <dl class="codebox"><dt>Magnet:</dt><dd>{} <a class="magnetBtn" href="{}" title="Magnet link"><i class="icon fa-magnet"></i></a></dd></dl>"#,
                    r.context, r.uri
                )
            })
            .collect();

        format!(
            r##"<!DOCTYPE html>
<html><body>
<h2 class="topic-title"><a href="./viewtopic.php?t={thread_id}">{title}</a></h2>
<div id="p1{thread_id}" class="post has-profile bg2">
  <div class="inner">
    <div class="postbody">
      <div id="post_content1{thread_id}">
        <h3 class="first"><a href="#p1{thread_id}">{title}</a></h3>
        <ul class="post-buttons">
          <li><a href="./posting.php?mode=quote&amp;p=1{thread_id}" class="button"><span>Quote</span></a></li>
          {thanks_button}
        </ul>
        <div class="content">Release notes for {title}<br />{blocks}
        </div>
      </div>
    </div>
  </div>
</div>
<a href="./ucp.php?mode=logout&amp;sid=0f1e2d3c4b5a">Logout</a>
</body></html>"##
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{self, FixtureRelease};

    #[test]
    fn test_thread_page_renders_whole_template() {
        let html = fixtures::thread_page(
            "42",
            "Dark - Stagione 1",
            &[FixtureRelease::new("Dark S01E01", &fixtures::magnet("c1", None, None))],
            true,
        );
        assert!(html.contains(r##"<a href="#p142">Dark - Stagione 1</a>"##));
        assert!(html.contains("lnk_thanks_post142"));
        assert!(html.contains("magnet:?xt=urn:btih:c1"));
        assert!(html.trim_end().ends_with("</html>"));
    }
}
