//! Japanese text helpers
//!
//! Character classification and the two reading transforms used when
//! building note fields from captured expressions.

/// True for hiragana, including the combining sound marks
pub fn is_hiragana(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{3096}' | '\u{3099}'..='\u{309f}')
}

/// True for katakana, including the middle dot and prolonged sound mark
pub fn is_katakana(c: char) -> bool {
    matches!(c, '\u{30a0}'..='\u{30ff}')
}

/// True for any kana
pub fn is_kana(c: char) -> bool {
    is_hiragana(c) || is_katakana(c)
}

/// True for CJK ideographs in the ranges dictionaries use
pub fn is_kanji(c: char) -> bool {
    matches!(c, '\u{3400}'..='\u{4db5}' | '\u{4e00}'..='\u{9fcb}' | '\u{f900}'..='\u{fa6a}')
}

/// True for kana or kanji
pub fn is_kana_or_kanji(c: char) -> bool {
    is_kana(c) || is_kanji(c)
}

/// Remove bracketed furigana readings, keeping kanji and okurigana:
/// `緊[きん]張[ちょう]する` becomes `緊張する`.
pub fn strip_readings(expression: &str) -> String {
    let mut result = String::with_capacity(expression.len());
    let mut in_brackets = false;
    for c in expression.chars() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            _ if in_brackets => {}
            _ if is_kana_or_kanji(c) => result.push(c),
            _ => {}
        }
    }
    result
}

/// Keep only the kana of an expression with bracketed furigana:
/// `緊[きん]張[ちょう]する` becomes `きんちょうする`.
pub fn reading_form(expression: &str) -> String {
    expression.chars().filter(|c| is_kana(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_character_classes() {
        assert!(is_hiragana('あ'));
        assert!(!is_hiragana('ア'));
        assert!(is_katakana('ア'));
        assert!(is_katakana('ー'));
        assert!(is_kana('ん'));
        assert!(is_kanji('語'));
        assert!(!is_kanji('あ'));
        assert!(!is_kana_or_kanji('a'));
        assert!(!is_kana_or_kanji('。'));
    }

    #[test]
    fn strips_bracketed_readings() {
        assert_eq!(strip_readings("緊[きん]張[ちょう]する"), "緊張する");
        assert_eq!(strip_readings("緊[きん] 張[ちょう]する"), "緊張する");
        assert_eq!(strip_readings("ことば"), "ことば");
        assert_eq!(strip_readings(""), "");
    }

    #[test]
    fn extracts_the_reading() {
        assert_eq!(reading_form("緊[きん]張[ちょう]する"), "きんちょうする");
        assert_eq!(reading_form("言葉"), "");
        assert_eq!(reading_form("カタカナ語"), "カタカナ");
    }
}
