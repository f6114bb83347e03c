use anyhow::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;

use crate::config::ChannelConfig;
use crate::models::Posting;

/// Render postings as an RSS 2.0 document.
///
/// Each item carries title, link and a description equal to the title.
pub fn render_feed(postings: &[Posting], channel: &ChannelConfig, build_date: DateTime<Utc>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    text_element(&mut writer, "title", &channel.title)?;
    text_element(&mut writer, "link", &channel.link)?;
    text_element(&mut writer, "description", &channel.description)?;
    text_element(
        &mut writer,
        "lastBuildDate",
        &build_date.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    )?;

    for p in postings {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &p.title)?;
        text_element(&mut writer, "link", &p.link)?;
        text_element(&mut writer, "description", &p.title)?;
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::parse_items;
    use chrono::TimeZone;

    fn channel() -> ChannelConfig {
        ChannelConfig {
            title: "Cloud Engineer Jobs".to_string(),
            link: "https://example.com/jobs/rss".to_string(),
            description: "Aggregated Cloud Engineer Job Listings".to_string(),
        }
    }

    #[test]
    fn renders_channel_and_items() {
        let build = Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 0).unwrap();
        let postings = vec![
            Posting::new("DevOps Engineer", "https://x/y/1", "Mon, 01 Jan 2024", "https://feed/a"),
            Posting::new("R&D <Cloud>", "https://x/y/2?a=1&b=2", "No Date", "https://feed/b"),
        ];

        let xml = render_feed(&postings, &channel(), build).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<rss version=\"2.0\">"));
        assert!(xml.contains("<title>Cloud Engineer Jobs</title>"));
        assert!(xml.contains("<lastBuildDate>Mon, 01 Jan 2024 12:30:00 GMT</lastBuildDate>"));
        assert!(xml.contains("<description>DevOps Engineer</description>"));
        assert!(xml.contains("R&amp;D &lt;Cloud&gt;"));
        assert_eq!(xml.matches("<item>").count(), 2);
    }

    #[test]
    fn rendered_feed_parses_back() {
        let postings = vec![
            Posting::new("R&D <Cloud>", "https://x/y/2?a=1&b=2", "No Date", "https://feed/b"),
        ];
        let xml = render_feed(&postings, &channel(), Utc::now()).unwrap();

        let parsed = parse_items(xml.as_bytes(), "self").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].title, "R&D <Cloud>");
        assert_eq!(parsed[0].link, "https://x/y/2?a=1&b=2");
    }

    #[test]
    fn empty_feed_has_channel_only() {
        let xml = render_feed(&[], &channel(), Utc::now()).unwrap();
        assert!(xml.contains("<channel>"));
        assert!(!xml.contains("<item>"));
    }
}
