//! `Link` 標頭（RFC 5988）的關聯解析。

use crate::transport::HttpResponse;

/// 服務條款的關聯名稱。
pub const REL_TERMS_OF_SERVICE: &str = "terms-of-service";
/// 授權集合的關聯名稱。
pub const REL_NEXT: &str = "next";
/// 帳戶復原的關聯名稱。
pub const REL_RECOVER: &str = "recover";

/// 單一 link-value：目標 URI 與其參數。
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkValue {
    target: String,
    params: Vec<(String, String)>,
}

impl LinkValue {
    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// 由一組 `Link` 標頭解析出的關聯集合。
///
/// 關聯名稱不分大小寫；同一關聯出現多次時以第一個為準。
/// 格式錯誤的 link-value 會被略過並記錄警告，不影響其他值。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkRelations {
    links: Vec<LinkValue>,
}

impl LinkRelations {
    /// 解析多個 `Link` 標頭值；每個值可包含以逗號分隔的多個 link-value。
    pub fn parse<'a, I>(field_values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut links = Vec::new();
        for value in field_values {
            parse_field(value, &mut links);
        }
        Self { links }
    }

    pub fn from_response(response: &HttpResponse) -> Self {
        Self::parse(response.header_values("Link"))
    }

    /// 取得第一個 `rel` 含有指定關聯名稱的目標 URI。
    pub fn first_target(&self, relation: &str) -> Option<&str> {
        self.links
            .iter()
            .find(|link| {
                link.param("rel").is_some_and(|rel| {
                    rel.split_ascii_whitespace()
                        .any(|name| name.eq_ignore_ascii_case(relation))
                })
            })
            .map(|link| link.target.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn parse_field(value: &str, links: &mut Vec<LinkValue>) {
    let mut scanner = Scanner::new(value);
    loop {
        scanner.skip_separators();
        if scanner.at_end() {
            break;
        }

        let start = scanner.pos;
        match parse_link_value(&mut scanner) {
            Ok(link) => links.push(link),
            Err(reason) => {
                scanner.pos = start;
                scanner.skip_to_next_value();
                log::warn!(
                    "Skipping malformed Link value {:?}: {reason}",
                    &value[start..scanner.pos]
                );
            }
        }
    }
}

fn parse_link_value(scanner: &mut Scanner<'_>) -> Result<LinkValue, &'static str> {
    if !scanner.eat(b'<') {
        return Err("expected '<'");
    }
    let target = scanner.take_while(|b| b != b'>').to_owned();
    if !scanner.eat(b'>') {
        return Err("unterminated URI reference");
    }

    let mut params: Vec<(String, String)> = Vec::new();
    loop {
        scanner.skip_whitespace();
        match scanner.peek() {
            None => break,
            Some(b',') => {
                scanner.bump();
                break;
            }
            Some(b';') => {
                scanner.bump();
                scanner.skip_whitespace();
                let name = scanner
                    .take_while(|b| !matches!(b, b'=' | b';' | b',') && !b.is_ascii_whitespace())
                    .to_ascii_lowercase();
                if name.is_empty() {
                    return Err("empty parameter name");
                }

                scanner.skip_whitespace();
                let value = if scanner.eat(b'=') {
                    scanner.skip_whitespace();
                    if scanner.eat(b'"') {
                        scanner.quoted_string().ok_or("unterminated quoted-string")?
                    } else {
                        scanner
                            .take_while(|b| !matches!(b, b';' | b',') && !b.is_ascii_whitespace())
                            .to_owned()
                    }
                } else {
                    String::new()
                };

                if params.iter().any(|(key, _)| *key == name) {
                    return Err("duplicate parameter");
                }
                params.push((name, value));
            }
            Some(_) => return Err("unexpected character after parameter"),
        }
    }

    Ok(LinkValue { target, params })
}

/// 以位元組為單位的簡易掃描器；分隔字元皆為 ASCII，切片邊界一定落在 UTF-8 字元邊界上。
struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, accept: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(|b| b.is_ascii_whitespace());
    }

    fn skip_separators(&mut self) {
        self.take_while(|b| b == b',' || b.is_ascii_whitespace());
    }

    /// 開頭的雙引號已被消耗；處理反斜線跳脫直到結尾引號。
    fn quoted_string(&mut self) -> Option<String> {
        let mut out = Vec::new();
        loop {
            match self.bump()? {
                b'"' => return Some(String::from_utf8_lossy(&out).into_owned()),
                b'\\' => out.push(self.bump()?),
                b => out.push(b),
            }
        }
    }

    /// 略過目前的 link-value，停在下一個不在角括號或引號內的逗號之後。
    fn skip_to_next_value(&mut self) {
        let mut in_angle = false;
        let mut in_quotes = false;
        while let Some(b) = self.bump() {
            if in_angle {
                in_angle = b != b'>';
            } else if in_quotes {
                match b {
                    b'"' => in_quotes = false,
                    b'\\' => {
                        self.bump();
                    }
                    _ => {}
                }
            } else {
                match b {
                    b'<' => in_angle = true,
                    b'"' => in_quotes = true,
                    b',' => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_relation() {
        let links = LinkRelations::parse(["<https://example.com/terms>;rel=\"terms-of-service\""]);
        assert_eq!(
            links.first_target(REL_TERMS_OF_SERVICE),
            Some("https://example.com/terms")
        );
        assert_eq!(links.first_target(REL_NEXT), None);
    }

    #[test]
    fn test_multiple_values_in_one_field() {
        let links = LinkRelations::parse([
            "<https://example.com/authz>; rel=\"next\", <https://example.com/recover>; rel=recover",
        ]);
        assert_eq!(links.first_target(REL_NEXT), Some("https://example.com/authz"));
        assert_eq!(
            links.first_target(REL_RECOVER),
            Some("https://example.com/recover")
        );
    }

    #[test]
    fn test_first_match_wins_across_fields() {
        let links = LinkRelations::parse([
            "<https://example.com/first>;rel=\"next\"",
            "<https://example.com/second>;rel=\"next\"",
        ]);
        assert_eq!(links.first_target(REL_NEXT), Some("https://example.com/first"));
    }

    #[test]
    fn test_rel_is_case_insensitive_and_space_separated() {
        let links = LinkRelations::parse(["<https://example.com/x>; REL=\"Up NEXT\""]);
        assert_eq!(links.first_target("next"), Some("https://example.com/x"));
        assert_eq!(links.first_target("up"), Some("https://example.com/x"));
    }

    #[test]
    fn test_quoted_string_escapes() {
        let links = LinkRelations::parse([
            "<https://example.com/a,b>; title=\"say \\\"hi\\\", ok\"; rel=\"next\"",
        ]);
        assert_eq!(links.first_target(REL_NEXT), Some("https://example.com/a,b"));
        assert_eq!(
            links.links[0].param("title"),
            Some("say \"hi\", ok")
        );
    }

    #[test]
    fn test_malformed_value_is_skipped() {
        let links = LinkRelations::parse([
            "garbage; rel=\"next\", <https://example.com/good>; rel=\"next\"",
            "<https://example.com/dup>; rel=a; rel=b",
            "<https://example.com/open; rel=\"recover\"",
        ]);
        assert_eq!(links.first_target(REL_NEXT), Some("https://example.com/good"));
        assert_eq!(links.first_target("a"), None);
        assert_eq!(links.first_target(REL_RECOVER), None);
    }

    #[test]
    fn test_from_response_reads_every_link_header() {
        let response = HttpResponse::new(201, "https://example.com/new-reg")
            .with_header("Link", "<https://example.com/tos>;rel=\"terms-of-service\"")
            .with_header("link", "<https://example.com/authz>;rel=\"next\"");
        let links = LinkRelations::from_response(&response);
        assert_eq!(
            links.first_target(REL_TERMS_OF_SERVICE),
            Some("https://example.com/tos")
        );
        assert_eq!(links.first_target(REL_NEXT), Some("https://example.com/authz"));
        assert!(LinkRelations::parse([]).is_empty());
    }
}
