//! 路径解析
//!
//! 宿主交给文件系统的总是绝对路径，形如`/a/b/c`。
//! 路径项原样交给目录查找，`.`与`..`由目录中的同名目录项自然解析。

pub trait Path {
    fn is_absolute(&self) -> bool;

    /// 依次返回各路径项，忽略重复的`/`
    fn components(&self) -> Components<'_>;

    /// 返回路径的`(父目录, 文件名)`，根目录返回`None`
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    fn file_name(&self) -> Option<&Self> {
        self.parent_file().map(|(_, file)| file)
    }
}

pub type Components<'a> = core::iter::Filter<core::str::Split<'a, char>, fn(&&str) -> bool>;

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn components(&self) -> Components<'_> {
        self.split('/').filter(is_component as fn(&&str) -> bool)
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let trimmed = self.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        trimmed
            .rsplit_once('/')
            .map(|(p, f)| if p.is_empty() { ("/", f) } else { (p, f) })
            .or(Some(("/", trimmed)))
    }
}

fn is_component(cmp: &&str) -> bool {
    !cmp.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_skip_empty() {
        let cmps: Vec<_> = "//a/b//c/".components().collect();
        assert_eq!(cmps, ["a", "b", "c"]);
        assert_eq!("/".components().count(), 0);
    }

    #[test]
    fn parent_and_file() {
        assert_eq!("/".parent_file(), None);
        assert_eq!("/f".parent_file(), Some(("/", "f")));
        assert_eq!("/a/b/c".parent_file(), Some(("/a/b", "c")));
        assert_eq!("/a/b/".parent_file(), Some(("/a", "b")));
        assert_eq!("/a/b".file_name(), Some("b"));
        assert!("/a".is_absolute());
    }
}
