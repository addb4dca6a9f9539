//! Compare - ローカル集合とリモート集合の突き合わせ（Set Reconciler）
//!
//! 両側を比較キーで安定ソートしてからマージします。
//! - ローカルにだけある → `removed`
//! - 両方にある → `common_local[i]` と `common_remote[i]` がペア
//! - リモートにだけある → `added`
//!
//! 同じキーが複数あるときは入力順に 1 対 1 で組み、余った分が removed / added になります。

use crate::domain::Result;
use std::cmp::Ordering;

/// 突き合わせに使うキー。計算できない（壊れたエンティティ）なら Err
pub trait CompareKey {
    fn compare_key(&self) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDiff<L, R> {
    pub removed: Vec<L>,
    pub common_local: Vec<L>,
    pub common_remote: Vec<R>,
    pub added: Vec<R>,
}

impl<L, R> SetDiff<L, R> {
    fn empty() -> Self {
        Self {
            removed: Vec::new(),
            common_local: Vec::new(),
            common_remote: Vec::new(),
            added: Vec::new(),
        }
    }

    /// (local, remote) のペア
    pub fn common_pairs(&self) -> impl Iterator<Item = (&L, &R)> {
        self.common_local.iter().zip(self.common_remote.iter())
    }
}

fn keyed<T: CompareKey>(items: Vec<T>) -> Result<Vec<(String, T)>> {
    let mut keyed = items
        .into_iter()
        .map(|item| Ok((item.compare_key()?, item)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed)
}

pub fn compare_sets<L, R>(local: Vec<L>, remote: Vec<R>) -> Result<SetDiff<L, R>>
where
    L: CompareKey,
    R: CompareKey,
{
    let mut local = keyed(local)?.into_iter().peekable();
    let mut remote = keyed(remote)?.into_iter().peekable();
    let mut diff = SetDiff::empty();

    loop {
        let order = match (local.peek(), remote.peek()) {
            (Some((lk, _)), Some((rk, _))) => lk.cmp(rk),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match order {
            Ordering::Less => {
                if let Some((_, item)) = local.next() {
                    diff.removed.push(item);
                }
            }
            Ordering::Greater => {
                if let Some((_, item)) = remote.next() {
                    diff.added.push(item);
                }
            }
            Ordering::Equal => {
                if let (Some((_, l)), Some((_, r))) = (local.next(), remote.next()) {
                    diff.common_local.push(l);
                    diff.common_remote.push(r);
                }
            }
        }
    }

    Ok(diff)
}
