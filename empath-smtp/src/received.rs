//! Builds the `Received:` trace header prepended to a message's body before it is handed
//! to the spool.
//!
//! Format mirrors traditional MTA trace headers: LF-terminated, tab-indented
//! continuations, one optional TLS line, one optional `for <rcpt>` line (only when the
//! transaction had exactly one recipient), and a final timestamp line.

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use empath_common::context::Context;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Allocates the next trace id for this process, as a zero-padded 8-hex string.
fn next_id() -> String {
    format!("{:08X}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Renders the `Received:` header for a message about to be spooled.
///
/// `peer` is the connecting socket address; `local_hostname` is the server's own banner.
/// TLS fields are read from `ctx.metadata` (`tls`/`protocol`/`cipher`), set by the session
/// on STARTTLS upgrade.
#[must_use]
pub fn build(ctx: &Context, peer: SocketAddr, local_hostname: &str) -> String {
    let literal = format!("[{}]", peer.ip());
    let ptr_name = ctx
        .metadata
        .get("ptr_name")
        .map_or_else(|| literal.clone(), Clone::clone);
    let esmtp_tag = if ctx.extended { "ESMTP" } else { "SMTP" };

    let mut header = format!(
        "Received: from {} ({ptr_name} {literal})\n\tby {local_hostname} ({esmtp_tag}) id {}",
        if ctx.id.is_empty() { "unknown" } else { &ctx.id },
        next_id(),
    );

    if ctx.metadata.get("tls").map(String::as_str) == Some("true") {
        let protocol = ctx.metadata.get("protocol").map_or("unknown", String::as_str);
        let cipher = ctx.metadata.get("cipher").map_or("unknown", String::as_str);
        header.push_str(&format!("\n\t(version={protocol}, cipher={cipher})"));
    }

    let recipients = ctx.envelope.recipients();
    if recipients.len() == 1 {
        header.push_str(&format!("\n\tfor <{}>;", recipients[0]));
    }

    header.push_str(&format!("\n\t{}\n", chrono::Local::now().to_rfc2822()));

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context {
            id: "mx.example.".to_string(),
            extended: true,
            banner: "mx.local".into(),
            ..Default::default()
        }
    }

    #[test]
    fn includes_helo_id_and_esmtp_tag() {
        let header = build(&ctx(), "127.0.0.1:25".parse().unwrap(), "mx.local");
        assert!(header.starts_with("Received: from mx.example. "));
        assert!(header.contains("(ESMTP) id "));
    }

    #[test]
    fn omits_tls_line_when_not_set() {
        let header = build(&ctx(), "127.0.0.1:25".parse().unwrap(), "mx.local");
        assert!(!header.contains("version="));
    }

    #[test]
    fn includes_tls_line_when_set() {
        let mut context = ctx();
        context.metadata.insert("tls".to_string(), "true".to_string());
        context
            .metadata
            .insert("protocol".to_string(), "TLSv1.3".to_string());
        context
            .metadata
            .insert("cipher".to_string(), "TLS13_AES_256_GCM_SHA384".to_string());

        let header = build(&context, "127.0.0.1:25".parse().unwrap(), "mx.local");
        assert!(header.contains("version=TLSv1.3, cipher=TLS13_AES_256_GCM_SHA384"));
    }

    #[test]
    fn includes_for_line_only_with_single_recipient() {
        let mut context = ctx();
        let recipient = mailparse::addrparse("one@example.com").unwrap().remove(0);
        context.envelope.recipients_mut().push(recipient.into());

        let header = build(&context, "127.0.0.1:25".parse().unwrap(), "mx.local");
        assert!(header.contains("for <one@example.com>;"));
    }
}
