//! HTML pages for the operator UI.

use listing_review::html::{escape, price};
use listing_review::store::{AlertListing, ReviewBatch, ReviewFilter};
use std::fmt::Write as _;

const STYLE: &str = "body{font-family:sans-serif;margin:2em;max-width:960px}\
    nav a{margin-right:1em}table{border-collapse:collapse;width:100%}\
    td,th{border-bottom:1px solid #ddd;padding:.4em;text-align:left}\
    .actions a{margin-right:.8em}";

fn layout(title: &str, new_properties: &str, content: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body>\
         <nav><a href=\"/\">Home</a>\
         <a href=\"/email_template?id=latest\">Latest{badge}</a>\
         <a href=\"/download\">Download</a>\
         <a href=\"/settings\">Settings</a></nav>\
         <h1>{title}</h1>{content}</body></html>",
        title = escape(title),
        badge = escape(new_properties),
    )
}

pub(crate) fn index_page(batches: &[ReviewBatch], new_properties: &str) -> String {
    let mut content = String::new();
    if batches.is_empty() {
        content.push_str("<p>No reviews yet.</p>");
    } else {
        content.push_str("<table><tr><th>Review</th><th>Date</th><th></th></tr>");
        for batch in batches {
            let id = batch.email_id;
            let _ = write!(
                content,
                "<tr><td>{id}</td><td>{date}</td><td class=\"actions\">\
                 <a href=\"/email_template?id={id}\">View</a>\
                 <a href=\"/send_email?id={id}\">Send email</a>\
                 <a href=\"/delete_review?id={id}\">Delete</a></td></tr>",
                date = escape(&batch.str_date),
            );
        }
        content.push_str("</table>");
    }
    layout("Home", new_properties, &content)
}

pub(crate) fn template_page(
    filter: ReviewFilter,
    listings: &[AlertListing],
    new_properties: &str,
) -> String {
    let param = filter.as_param();
    let mut content = String::new();

    let _ = write!(
        content,
        "<p class=\"actions\"><a href=\"/send_email?id={param}\">Send email</a>"
    );
    if filter == ReviewFilter::Open {
        content.push_str("<a href=\"/review_latest\">Mark reviewed</a>");
    }
    content.push_str("</p>");

    if listings.is_empty() {
        content.push_str("<p>No properties.</p>");
    } else {
        content.push_str(
            "<table><tr><th>Address</th><th>Price</th><th>Beds</th><th>Type</th>\
             <th>Travel</th><th>Description</th></tr>",
        );
        for listing in listings {
            let bedrooms = listing
                .bedrooms
                .map(|beds| beds.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(
                content,
                "<tr><td><a href=\"{url}\">{address}</a></td><td>{price}</td><td>{bedrooms}</td>\
                 <td>{kind}</td><td>{travel} min</td><td>{description}</td></tr>",
                url = escape(&listing.url),
                address = escape(&listing.address),
                price = price(listing.price),
                kind = escape(listing.property_type.as_deref().unwrap_or("-")),
                travel = listing.travel_time,
                description = escape(listing.description.as_deref().unwrap_or("")),
            );
        }
        content.push_str("</table>");
    }

    let title = match filter {
        ReviewFilter::Open => "View properties - latest".to_string(),
        ReviewFilter::Batch(id) => format!("View properties - review {id}"),
    };
    layout(&title, new_properties, &content)
}

pub(crate) fn settings_page(recipients: &[String]) -> String {
    let mut content = String::from("<form method=\"post\" action=\"/settings\">");
    for recipient in recipients.iter().map(String::as_str).chain(std::iter::once("")) {
        let _ = write!(
            content,
            "<p><input type=\"email\" name=\"recipients[]\" value=\"{}\"></p>",
            escape(recipient)
        );
    }
    content.push_str("<button type=\"submit\">Save</button></form>");
    layout("Settings", "", &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use listing_review::store::BatchId;

    #[test]
    fn index_links_every_batch_action() {
        let batches = vec![ReviewBatch {
            email_id: BatchId(4),
            str_date: "17 Oct 2026 09:30".to_string(),
            reviewed_date: Utc::now(),
        }];
        let page = index_page(&batches, " - 2 new");
        assert!(page.contains("Latest - 2 new"));
        assert!(page.contains("/email_template?id=4"));
        assert!(page.contains("/send_email?id=4"));
        assert!(page.contains("/delete_review?id=4"));
    }

    #[test]
    fn listing_text_is_escaped() {
        let listings = vec![AlertListing {
            listing_id: 1,
            address: "<script>alert(1)</script>".to_string(),
            price: 250_000,
            bedrooms: None,
            property_type: None,
            url: "https://listings.example/1".to_string(),
            description: None,
            travel_time: 30,
            review_id: None,
        }];
        let page = template_page(ReviewFilter::Open, &listings, "");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("/review_latest"));
        assert!(page.contains("£250,000"));
    }

    #[test]
    fn settings_form_offers_a_blank_row() {
        let page = settings_page(&["a@x.com".to_string()]);
        assert_eq!(page.matches("name=\"recipients[]\"").count(), 2);
        assert!(page.contains("value=\"a@x.com\""));
    }
}
