//! 検索用の住所要素名の正規化
//!
//! ノードの`name_index`とレジストリの検索キーはどちらも[`normalize`]で生成されます。
//! 同じ関数を使うことで、表記揺れのある名前が一つのノードにまとめられ、
//! シリアライズ後のノードから`name_index`を再計算しても同じ値になります。
//!
//! 正規化は以下の順に行われます。
//!
//! 1. 全角英数字・記号を半角に、半角カタカナを全角に変換します(濁点・半濁点は合成)。
//! 2. 英字を小文字に、カタカナをひらがなに変換します。小書きの「ヵ」「ヶ」は「か」「け」になります。
//! 3. 空白と区切り記号(`・`, `-`, `－`, `、`, `。`, 括弧、引用符など)を取り除きます。
//!    長音記号`ー`は名前の一部として残します。
//! 4. 漢数字の並び(`〇`〜`九`, `十`, `百`, `千`)を算用数字に置き換えます。
//! 5. 数字の直後にある末尾の「丁目」を取り除きます(`一丁目` ≡ `1丁目` ≡ `1`)。

const HALFWIDTH_KANA: &str = "ｦｧｨｩｪｫｬｭｮｯｰｱｲｳｴｵｶｷｸｹｺｻｼｽｾｿﾀﾁﾂﾃﾄﾅﾆﾇﾈﾉﾊﾋﾌﾍﾎﾏﾐﾑﾒﾓﾔﾕﾖﾗﾘﾙﾚﾛﾜﾝ";
const FULLWIDTH_KANA: &str = "ヲァィゥェォャュョッーアイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワン";

const HALFWIDTH_VOICED_MARK: char = '\u{FF9E}';
const HALFWIDTH_SEMI_VOICED_MARK: char = '\u{FF9F}';

const CHOME: &str = "丁目";

/// 住所要素名を検索用の形に正規化します。
///
/// # 例
///
/// ```
/// use addrdict::normalize::normalize;
///
/// assert_eq!(normalize("丸の内一丁目"), normalize("丸ノ内１丁目"));
/// assert_eq!(normalize("丸の内一丁目"), "丸の内1");
/// assert_eq!(normalize("ＡＢＣビル"), "abcびる");
/// ```
pub fn normalize(name: &str) -> String {
    let folded = fold_chars(name);
    let mut out = replace_kanji_numerals(&folded);
    strip_trailing_chome(&mut out);
    out
}

/// 文字単位の変換(手順1〜3)を行います。
fn fold_chars(name: &str) -> Vec<char> {
    let mut out: Vec<char> = Vec::with_capacity(name.chars().count());
    for c in name.chars() {
        match c {
            HALFWIDTH_VOICED_MARK => {
                if let Some(last) = out.last_mut()
                    && let Some(voiced) = voiced(*last)
                {
                    *last = voiced;
                }
                continue;
            }
            HALFWIDTH_SEMI_VOICED_MARK => {
                if let Some(last) = out.last_mut()
                    && let Some(semi_voiced) = semi_voiced(*last)
                {
                    *last = semi_voiced;
                }
                continue;
            }
            _ => {}
        }

        let c = fold_width(c);
        if is_separator(c) {
            continue;
        }
        out.push(c.to_ascii_lowercase());
    }
    // 濁点の合成が終わってからひらがなにする
    for c in out.iter_mut() {
        *c = fold_kana(*c);
    }
    out
}

/// 全角ASCIIを半角に、半角カタカナを全角カタカナに変換します。
fn fold_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        '\u{FF66}'..='\u{FF9D}' => HALFWIDTH_KANA
            .chars()
            .zip(FULLWIDTH_KANA.chars())
            .find_map(|(h, f)| (h == c).then_some(f))
            .unwrap_or(c),
        _ => c,
    }
}

/// カタカナをひらがなに変換します。
fn fold_kana(c: char) -> char {
    match c {
        // ヵ, ヶ は通常の大きさの か, け にする
        'ヵ' | 'ゕ' => 'か',
        'ヶ' | 'ゖ' => 'け',
        '\u{30A1}'..='\u{30F4}' => char::from_u32(c as u32 - 0x60).unwrap_or(c),
        _ => c,
    }
}

/// 濁点を合成した全角カタカナ
fn voiced(c: char) -> Option<char> {
    match c {
        'ウ' => Some('ヴ'),
        'カ' | 'キ' | 'ク' | 'ケ' | 'コ' | 'サ' | 'シ' | 'ス' | 'セ' | 'ソ' | 'タ' | 'チ'
        | 'ツ' | 'テ' | 'ト' | 'ハ' | 'ヒ' | 'フ' | 'ヘ' | 'ホ' => char::from_u32(c as u32 + 1),
        _ => None,
    }
}

/// 半濁点を合成した全角カタカナ
fn semi_voiced(c: char) -> Option<char> {
    match c {
        'ハ' | 'ヒ' | 'フ' | 'ヘ' | 'ホ' => char::from_u32(c as u32 + 2),
        _ => None,
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_ascii_punctuation()
        || matches!(
            c,
            '・' | '･' | '‐' | '‑' | '–' | '—' | '―' | '−' | '、' | '。' | '｡' | '､' | '「' | '」'
                | '『' | '』' | '〔' | '〕' | '【' | '】' | '’' | '‘' | '”' | '“' | '〜'
        )
}

fn kanji_digit(c: char) -> Option<u64> {
    match c {
        '〇' => Some(0),
        '一' => Some(1),
        '二' => Some(2),
        '三' => Some(3),
        '四' => Some(4),
        '五' => Some(5),
        '六' => Some(6),
        '七' => Some(7),
        '八' => Some(8),
        '九' => Some(9),
        _ => None,
    }
}

fn kanji_unit(c: char) -> Option<u64> {
    match c {
        '十' => Some(10),
        '百' => Some(100),
        '千' => Some(1000),
        _ => None,
    }
}

/// 漢数字の並びを算用数字に置き換えます(手順4)。
fn replace_kanji_numerals(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len() * 3);
    let mut i = 0;
    while i < chars.len() {
        let start = i;
        while i < chars.len() && (kanji_digit(chars[i]).is_some() || kanji_unit(chars[i]).is_some())
        {
            i += 1;
        }
        if start == i {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        out.push_str(&kanji_to_number(&chars[start..i]));
    }
    out
}

/// 漢数字の並びを数値文字列に変換します。
///
/// `十`, `百`, `千`を含む場合は位取りの単位として、含まない場合は各桁の並び(`二〇`=20)として解釈します。
/// 値が`u64`に収まらない場合は、各文字を一つずつ算用数字に置き換えます(`十`は`10`)。
fn kanji_to_number(run: &[char]) -> String {
    if run.iter().all(|&c| kanji_digit(c).is_some()) {
        return digits_only(run);
    }
    positional_value(run).map_or_else(|| digits_only(run), |v| v.to_string())
}

fn digits_only(run: &[char]) -> String {
    run.iter()
        .filter_map(|&c| kanji_digit(c).or_else(|| kanji_unit(c)))
        .map(|v| v.to_string())
        .collect()
}

fn positional_value(run: &[char]) -> Option<u64> {
    let mut total = 0u64;
    let mut current: Option<u64> = None;
    for &c in run {
        if let Some(d) = kanji_digit(c) {
            current = Some(current.unwrap_or(0).checked_mul(10)?.checked_add(d)?);
        } else if let Some(unit) = kanji_unit(c) {
            total = total.checked_add(current.take().unwrap_or(1).checked_mul(unit)?)?;
        }
    }
    total.checked_add(current.unwrap_or(0))
}

/// 数字に続く末尾の「丁目」を取り除きます(手順5)。
fn strip_trailing_chome(s: &mut String) {
    if let Some(body) = s.strip_suffix(CHOME)
        && body.chars().last().is_some_and(|c| c.is_ascii_digit())
    {
        let len = body.len();
        s.truncate(len);
    }
}
