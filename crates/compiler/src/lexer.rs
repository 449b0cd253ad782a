//! Tokenizer for s-expression source.
//!
//! Produces a flat stream of tokens with 0-indexed line/column positions.
//! `(`, `)` and `'` are single-character tokens; `;` starts a comment that
//! runs to end of line; any other maximal run of non-delimiter characters
//! is an atom. The lexer itself never fails — malformed atoms surface as
//! parse errors.

/// A token with source position information.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    /// Line number (0-indexed).
    pub line: usize,
    /// Column number (0-indexed).
    pub column: usize,
}

impl Token {
    fn new(text: impl Into<String>, line: usize, column: usize) -> Self {
        Token { text: text.into(), line, column }
    }
}

impl PartialEq<&str> for Token {
    fn eq(&self, other: &&str) -> bool {
        self.text == *other
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | ';')
}

/// Split `source` into tokens.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (line_no, line) in source.lines().enumerate() {
        let mut chars = line.char_indices().peekable();
        while let Some(&(col, c)) = chars.peek() {
            match c {
                _ if c.is_whitespace() => {
                    chars.next();
                }
                ';' => break, // comment to end of line
                '(' | ')' | '\'' => {
                    tokens.push(Token::new(c, line_no, col));
                    chars.next();
                }
                _ => {
                    let start = col;
                    let mut end = col;
                    while let Some(&(i, c)) = chars.peek() {
                        if is_delimiter(c) {
                            break;
                        }
                        end = i + c.len_utf8();
                        chars.next();
                    }
                    tokens.push(Token::new(&line[start..end], line_no, start));
                }
            }
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        tokenize(src).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_simple_form() {
        assert_eq!(texts("(+ 1 2)"), ["(", "+", "1", "2", ")"]);
    }

    #[test]
    fn test_quote_and_dot() {
        assert_eq!(texts("'(1 . 2)"), ["'", "(", "1", ".", "2", ")"]);
    }

    #[test]
    fn test_no_spaces_around_parens() {
        assert_eq!(
            texts("(define (f x)(+ x 1))"),
            ["(", "define", "(", "f", "x", ")", "(", "+", "x", "1", ")", ")"]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(texts("1 ; one\n2"), ["1", "2"]);
        assert_eq!(texts("; only a comment"), Vec::<String>::new());
    }

    #[test]
    fn test_positions() {
        let toks = tokenize("(a\n  bc)");
        assert_eq!((toks[0].line, toks[0].column), (0, 0));
        assert_eq!((toks[1].line, toks[1].column), (0, 1));
        assert_eq!((toks[2].line, toks[2].column), (1, 2));
        assert_eq!(toks[2].text, "bc");
        assert_eq!((toks[3].line, toks[3].column), (1, 4));
    }

    #[test]
    fn test_hash_literals_are_atoms() {
        assert_eq!(texts("#t #f"), ["#t", "#f"]);
    }
}
