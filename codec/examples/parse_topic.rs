// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use nanomq_codec::TopicFilter;

fn main() {
    let sys_filter = TopicFilter::parse("$SYS/dev/cpu/+").unwrap();
    println!("sys_filter: {sys_filter:?}");
    assert!(sys_filter.is_match("$SYS/dev/cpu/01"));

    let all = TopicFilter::parse("#").unwrap();
    assert!(all.is_match("dev/cpu/01"));
    // Reserved topics never match a wildcard at the root.
    assert!(!all.is_match("$SYS/dev/cpu/01"));
}
