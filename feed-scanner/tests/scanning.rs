use feed_scanner::{FeedPage, Html, PostScanner, PresentationChange, SnapshotPage};
use feedfilter_core::{PostLocator, PostRecord};

fn tweet(id: &str, text: &str) -> String {
    format!(
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet">
               <a href="/someone">@someone</a>
               <a href="/someone/status/{id}"><time>1h</time></a>
               <div data-testid="tweetText"><span>{text}</span></div>
             </article>
           </div>"#
    )
}

fn quote_tweet(id: &str, text: &str, quoted: &str) -> String {
    format!(
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet">
               <a href="/someone/status/{id}">1h</a>
               <div data-testid="tweetText">{text}</div>
               <div data-testid="quoteTweet">
                 <div data-testid="tweetText">{quoted}</div>
               </div>
             </article>
           </div>"#
    )
}

fn page(cells: &[String]) -> String {
    format!("<html><body><main>{}</main></body></html>", cells.concat())
}

fn scan(html: &str, page: &SnapshotPage) -> Vec<PostRecord> {
    let scanner = PostScanner::with_default_contract().unwrap();
    let document = Html::parse_document(html);
    scanner.scan(&document, page).collect()
}

#[test]
fn test_extracts_posts_in_document_order() {
    let html = page(&[
        tweet("12345", "  Election results are in  "),
        tweet("67890", "Look at my cat"),
    ]);
    let posts = scan(&html, &SnapshotPage::from_html(html.clone()));

    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].identifier, "12345");
    assert_eq!(posts[0].primary_text, "Election results are in");
    assert_eq!(posts[0].quoted_text, None);
    assert_eq!(posts[0].locator, PostLocator::new("12345"));
    assert_eq!(posts[1].identifier, "67890");
}

#[test]
fn test_extracts_quoted_text() {
    let html = page(&[quote_tweet("11111", "Interesting take", "Outrageous policy")]);
    let posts = scan(&html, &SnapshotPage::from_html(html.clone()));

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].primary_text, "Interesting take");
    assert_eq!(posts[0].quoted_text.as_deref(), Some("Outrageous policy"));
}

#[test]
fn test_empty_quote_is_absent() {
    let html = page(&[quote_tweet("11111", "Interesting take", "   ")]);
    let posts = scan(&html, &SnapshotPage::from_html(html.clone()));

    assert_eq!(posts[0].quoted_text, None);
}

#[test]
fn test_skips_containers_without_posts() {
    let html = page(&[
        r#"<div data-testid="cellInnerDiv"><h2>Who to follow</h2></div>"#.to_string(),
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet"><div data-testid="tweetText">no link</div></article>
           </div>"#
            .to_string(),
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet"><a href="/someone/status/33333">1h</a></article>
           </div>"#
            .to_string(),
        tweet("44444", "kept"),
    ]);
    let posts = scan(&html, &SnapshotPage::from_html(html.clone()));

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].identifier, "44444");
}

#[test]
fn test_skips_processed_posts() {
    let html = page(&[
        tweet("12345", "first"),
        r#"<div data-testid="cellInnerDiv" data-x-content-filter-processed="true">
             <article data-testid="tweet">
               <a href="/someone/status/55555">1h</a>
               <div data-testid="tweetText">already seen</div>
             </article>
           </div>"#
            .to_string(),
        tweet("67890", "second"),
    ]);
    let feed = SnapshotPage::from_html(html.clone());
    assert!(feed.apply(&PostLocator::new("12345"), PresentationChange::MarkProcessed));

    let posts = scan(&html, &feed);

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].identifier, "67890");
}

#[test]
fn test_scan_is_repeatable() {
    let html = page(&[tweet("12345", "first"), tweet("67890", "second")]);
    let feed = SnapshotPage::from_html(html.clone());
    let scanner = PostScanner::with_default_contract().unwrap();
    let document = Html::parse_document(&feed.snapshot().unwrap());

    let first: Vec<_> = scanner.scan(&document, &feed).collect();
    let second: Vec<_> = scanner.scan(&document, &feed).collect();
    assert_eq!(first, second);

    let mut lazy = scanner.scan(&document, &feed);
    assert_eq!(lazy.next().map(|p| p.identifier), Some("12345".to_string()));
}
